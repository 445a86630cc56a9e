#![forbid(unsafe_code)]

use precinct_contracts::discord::DiscordVerifiedRecord;
use precinct_contracts::profile::OfficerProfile;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::kv::{KvStore, StorageError};

pub const OFFICER_PROFILE_KEY: &str = "officerProfile";
pub const SAVED_OFFICER_LIST_KEY: &str = "savedOfficerList";
pub const DISCORD_VERIFIED_KEY: &str = "discordVerified";
pub const SESSION_COOKIE_KEY: &str = "sessionCookie";

/// Typed view over the client's durable keys.
#[derive(Debug)]
pub struct ClientStore<S: KvStore> {
    kv: S,
}

impl<S: KvStore> ClientStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn officer_profile(&self) -> Result<Option<OfficerProfile>, StorageError> {
        self.read_json(OFFICER_PROFILE_KEY)
    }

    /// Overwrites whatever profile was stored before.
    pub fn put_officer_profile(&self, profile: &OfficerProfile) -> Result<(), StorageError> {
        self.write_json(OFFICER_PROFILE_KEY, profile)
    }

    pub fn saved_officers(&self) -> Result<Vec<OfficerProfile>, StorageError> {
        Ok(self
            .read_json::<Vec<OfficerProfile>>(SAVED_OFFICER_LIST_KEY)?
            .unwrap_or_default())
    }

    /// Replaces the entry with the same badge in place, otherwise appends.
    pub fn upsert_saved_officer(
        &self,
        profile: &OfficerProfile,
    ) -> Result<Vec<OfficerProfile>, StorageError> {
        let mut officers = self.saved_officers()?;
        match officers
            .iter_mut()
            .find(|existing| existing.badge == profile.badge)
        {
            Some(existing) => *existing = profile.clone(),
            None => officers.push(profile.clone()),
        }
        self.write_json(SAVED_OFFICER_LIST_KEY, &officers)?;
        Ok(officers)
    }

    pub fn remove_saved_officer(&self, badge: &str) -> Result<bool, StorageError> {
        let mut officers = self.saved_officers()?;
        let before = officers.len();
        officers.retain(|o| o.badge != badge);
        if officers.len() == before {
            return Ok(false);
        }
        self.write_json(SAVED_OFFICER_LIST_KEY, &officers)?;
        Ok(true)
    }

    pub fn discord_verified(&self) -> Result<Option<DiscordVerifiedRecord>, StorageError> {
        Ok(self
            .read_json::<DiscordVerifiedRecord>(DISCORD_VERIFIED_KEY)?
            .filter(|record| record.verified))
    }

    pub fn put_discord_verified(&self, record: &DiscordVerifiedRecord) -> Result<(), StorageError> {
        self.write_json(DISCORD_VERIFIED_KEY, record)
    }

    pub fn clear_discord_verified(&self) -> Result<bool, StorageError> {
        self.kv.clear(DISCORD_VERIFIED_KEY)
    }

    pub fn session_cookie(&self) -> Result<Option<String>, StorageError> {
        self.kv.get(SESSION_COOKIE_KEY)
    }

    pub fn put_session_cookie(&self, cookie: &str) -> Result<(), StorageError> {
        self.kv.set(SESSION_COOKIE_KEY, cookie)
    }

    pub fn clear_session_cookie(&self) -> Result<bool, StorageError> {
        self.kv.clear(SESSION_COOKIE_KEY)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StorageError::Corrupt {
                key: key.to_string(),
                reason: err.to_string(),
            })
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw)?;
        debug!(key, "client store key updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    fn officer(badge: &str, callsign: &str) -> OfficerProfile {
        OfficerProfile {
            badge: badge.to_string(),
            name: format!("Officer {badge}"),
            rank: "Officer".to_string(),
            discord_id: None,
            callsign: callsign.to_string(),
        }
    }

    #[test]
    fn at_client_store_01_upsert_keeps_list_order() {
        let store = ClientStore::new(InMemoryKvStore::new());
        store.upsert_saved_officer(&officer("1", "A")).unwrap();
        store.upsert_saved_officer(&officer("2", "B")).unwrap();
        let list = store.upsert_saved_officer(&officer("1", "C")).unwrap();
        let summary = list
            .iter()
            .map(|o| (o.badge.as_str(), o.callsign.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![("1", "C"), ("2", "B")]);
    }

    #[test]
    fn at_client_store_02_corrupt_value_names_the_key() {
        let kv = InMemoryKvStore::new();
        kv.set(OFFICER_PROFILE_KEY, "not json").unwrap();
        let store = ClientStore::new(kv);
        let err = store.officer_profile().expect_err("corrupt value");
        assert!(matches!(err, StorageError::Corrupt { ref key, .. } if key == OFFICER_PROFILE_KEY));
    }

    #[test]
    fn at_client_store_03_unverified_record_reads_as_absent() {
        let kv = InMemoryKvStore::new();
        kv.set(
            DISCORD_VERIFIED_KEY,
            r#"{"verified":false,"user":{"id":"1","username":"x","discriminator":"0"},"timestamp":5}"#,
        )
        .unwrap();
        let store = ClientStore::new(kv);
        assert_eq!(store.discord_verified().unwrap(), None);
    }
}
