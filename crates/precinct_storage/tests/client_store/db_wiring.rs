#![forbid(unsafe_code)]

use precinct_contracts::discord::{DiscordIdentity, DiscordVerifiedRecord};
use precinct_contracts::profile::OfficerProfile;
use precinct_contracts::UnixTimeMs;
use precinct_storage::{
    ClientStore, FileKvStore, KvStore, DISCORD_VERIFIED_KEY, OFFICER_PROFILE_KEY,
    SAVED_OFFICER_LIST_KEY,
};

fn profile() -> OfficerProfile {
    OfficerProfile {
        badge: "1021".to_string(),
        name: "Jane Doe".to_string(),
        rank: "Sergeant".to_string(),
        discord_id: Some("80351110224678912".to_string()),
        callsign: "2-ADAM-12".to_string(),
    }
}

fn identity() -> DiscordIdentity {
    DiscordIdentity {
        id: "80351110224678912".to_string(),
        username: "jdoe".to_string(),
        discriminator: "0".to_string(),
    }
}

#[test]
fn at_store_db_01_all_keys_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client_store.json");

    let store = ClientStore::new(FileKvStore::for_path(path.clone()));
    store.put_officer_profile(&profile()).unwrap();
    store.upsert_saved_officer(&profile()).unwrap();
    store
        .put_discord_verified(&DiscordVerifiedRecord::v1(identity(), UnixTimeMs(1_700)))
        .unwrap();
    store.put_session_cookie("connect.sid=s%3Aabc").unwrap();

    let reopened = ClientStore::new(FileKvStore::for_path(path));
    assert_eq!(reopened.officer_profile().unwrap(), Some(profile()));
    assert_eq!(reopened.saved_officers().unwrap(), vec![profile()]);
    let record = reopened.discord_verified().unwrap().unwrap();
    assert_eq!(record.user, identity());
    assert_eq!(record.timestamp, UnixTimeMs(1_700));
    assert_eq!(
        reopened.session_cookie().unwrap().as_deref(),
        Some("connect.sid=s%3Aabc")
    );
}

#[test]
fn at_store_db_02_wire_shape_uses_browser_key_names() {
    let dir = tempfile::tempdir().unwrap();
    let kv = FileKvStore::for_path(dir.path().join("client_store.json"));
    let store = ClientStore::new(&kv);
    store.put_officer_profile(&profile()).unwrap();
    store.upsert_saved_officer(&profile()).unwrap();
    store
        .put_discord_verified(&DiscordVerifiedRecord::v1(identity(), UnixTimeMs(9)))
        .unwrap();

    let raw_profile: serde_json::Value =
        serde_json::from_str(&kv.get(OFFICER_PROFILE_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(raw_profile["discordId"], "80351110224678912");
    assert_eq!(raw_profile["callsign"], "2-ADAM-12");

    let raw_list: serde_json::Value =
        serde_json::from_str(&kv.get(SAVED_OFFICER_LIST_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(raw_list.as_array().map(Vec::len), Some(1));

    let raw_verified: serde_json::Value =
        serde_json::from_str(&kv.get(DISCORD_VERIFIED_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(raw_verified["verified"], true);
    assert_eq!(raw_verified["user"]["username"], "jdoe");
    assert_eq!(raw_verified["timestamp"], 9);
}

#[test]
fn at_store_db_03_clearing_verification_leaves_profile() {
    let dir = tempfile::tempdir().unwrap();
    let store = ClientStore::new(FileKvStore::for_path(dir.path().join("s.json")));
    store.put_officer_profile(&profile()).unwrap();
    store
        .put_discord_verified(&DiscordVerifiedRecord::v1(identity(), UnixTimeMs(9)))
        .unwrap();

    assert!(store.clear_discord_verified().unwrap());
    assert_eq!(store.discord_verified().unwrap(), None);
    assert_eq!(store.officer_profile().unwrap(), Some(profile()));
    assert!(store.remove_saved_officer("1021").is_ok());
}
