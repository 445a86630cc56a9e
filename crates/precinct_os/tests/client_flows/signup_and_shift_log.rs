#![forbid(unsafe_code)]

use std::time::Duration;

use precinct_contracts::discord::VerificationState;
use precinct_engines::{NoticeLevel, RecordingNotifier, ScriptedTransport};
use precinct_os::{
    ClientApp, Navigation, RecordingNavigator, Route, ShiftLogForm, SignupForm,
};
use precinct_storage::FileKvStore;
use serde_json::json;

type FlowApp = ClientApp<ScriptedTransport, FileKvStore, RecordingNotifier, RecordingNavigator>;

fn app_at(path: std::path::PathBuf) -> FlowApp {
    ClientApp::new(
        ScriptedTransport::new(),
        FileKvStore::for_path(path),
        RecordingNotifier::new(),
        RecordingNavigator::new(),
    )
}

fn me(rank: &str, callsign: &str) -> serde_json::Value {
    json!({
        "user": {
            "id": 11,
            "username": "rcruz",
            "isAdmin": false,
            "badgeNumber": "K-204",
            "fullName": "Rosa Cruz",
            "rank": rank,
            "discordId": "5150",
            "callsign": callsign
        }
    })
}

#[tokio::test(start_paused = true)]
async fn at_client_flow_01_failed_then_successful_verification_leads_to_signup_and_shift_log() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("client_store.json");
    let app = app_at(store_path.clone());
    let discord = app.discord();

    // First redirect: provider rejected the member.
    let failed = discord
        .handle_callback("http://localhost:5173/auth/discord/callback?error=not_member")
        .await
        .unwrap();
    assert!(matches!(failed, VerificationState::Failed(_)));
    let started = tokio::time::Instant::now();
    assert_eq!(discord.settle_failure().await, VerificationState::Unverified);
    assert_eq!(started.elapsed(), Duration::from_secs(3));

    // Second attempt goes through the code exchange.
    app.transport()
        .push_json(200, json!({"url": "https://discord.com/oauth2/authorize?state=s2"}))
        .push_json(
            200,
            json!({"user": {"id": "5150", "username": "rcruz", "discriminator": "0"}}),
        );
    discord.initiate().await.unwrap();
    let verified = discord
        .handle_callback("http://localhost:5173/auth/discord/callback?code=c2&state=s2")
        .await
        .unwrap();
    assert!(verified.is_verified());

    app.transport()
        .push_json(201, me("Officer", ""))
        .push_json(200, me("Officer", "3-MARY-4"));
    let mut signup = SignupForm::new(&app.verification_state()).unwrap();
    assert_eq!(signup.username(), "rcruz");
    signup.badge_number = "K-204".to_string();
    signup.password = "patrol-2026".to_string();
    signup.confirm_password = "patrol-2026".to_string();
    signup.full_name = Some("Rosa Cruz".to_string());
    signup.submit(&app).await.unwrap();

    // The refetched session already carries a callsign, so the cached profile follows it.
    let profile = app.store().officer_profile().unwrap().unwrap();
    assert_eq!(profile.callsign, "3-MARY-4");

    let mut form = ShiftLogForm::seeded(app.store()).unwrap();
    assert_eq!(form.officers.len(), 1);
    form.shift_date = "2026-10-16".to_string();
    form.start_time = "07:00".to_string();
    form.end_time = "15:00".to_string();
    form.patrol_area = "Harbor".to_string();
    app.transport().push_json(
        201,
        json!({
            "id": 1,
            "shiftDate": "2026-10-16",
            "startTime": "07:00",
            "endTime": "15:00",
            "patrolArea": "Harbor",
            "officers": [{"badge": "K-204", "name": "Rosa Cruz", "rank": "Officer", "callsign": "3-MARY-4"}],
            "notes": ""
        }),
    );
    let record = form.submit(&app).await.unwrap();
    assert_eq!(record.entry.patrol_area, "Harbor");

    assert_eq!(
        app.transport().paths(),
        vec![
            "GET /api/auth/discord/url",
            "POST /api/auth/discord/callback",
            "POST /api/auth/signup",
            "GET /api/auth/me",
            "POST /api/shift-logs",
        ]
    );
    assert_eq!(
        app.navigator().history().first(),
        Some(&Navigation::Internal(Route::Signup))
    );
    assert_eq!(app.notifier().last().unwrap().level, NoticeLevel::Success);

    // A fresh client on the same store resumes verified and with the officer list.
    let reopened = app_at(store_path);
    assert!(reopened.discord().restore().unwrap().is_verified());
    assert_eq!(reopened.store().saved_officers().unwrap().len(), 1);
}
