#![forbid(unsafe_code)]

//! Login, signup and shift-log forms. Validation runs before anything touches the network;
//! submissions go through the retrying mutation wrapper.

use precinct_contracts::api::{ApiEndpoint, QueryKey};
use precinct_contracts::auth::{LoginRequest, SessionUser, SignupRequest, UserEnvelope};
use precinct_contracts::discord::{DiscordIdentity, VerificationState};
use precinct_contracts::profile::{OfficerProfile, DEFAULT_RANK};
use precinct_contracts::shiftlog::{ShiftLogOfficer, ShiftLogRecord, ShiftLogRequest};
use precinct_contracts::FormErrors;
use precinct_engines::{ApiTransport, MutationSpec, Notifier};
use precinct_storage::{ClientStore, KvStore, StorageError};
use serde_json::Value;
use tracing::{info, warn};

use crate::app::ClientApp;
use crate::error::ClientError;
use crate::navigator::{Navigator, Route};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<LoginRequest, FormErrors> {
        let request = LoginRequest {
            username: self.username.trim().to_string(),
            password: self.password.clone(),
        };
        request.field_errors().into_result()?;
        Ok(request)
    }

    pub async fn submit<T, S, N, V>(
        &self,
        app: &ClientApp<T, S, N, V>,
    ) -> Result<SessionUser, ClientError>
    where
        T: ApiTransport,
        S: KvStore,
        N: Notifier,
        V: Navigator,
    {
        let request = self.validate()?;
        let spec = MutationSpec::new(ApiEndpoint::AuthLogin)
            .payload(&request)?
            .on_success("Logged in", None)
            .on_error("Login failed", "Could not log in. Please try again.")
            .invalidates([QueryKey::session()]);
        let envelope = app.runner().run::<UserEnvelope>(spec).await?;
        info!(user_id = envelope.user.id, "login accepted");
        let user = match app.refresh_session().await {
            Some(user) => user,
            None => {
                warn!("session not visible right after login");
                envelope.user
            }
        };
        app.navigator().go_to(Route::Landing);
        Ok(user)
    }
}

pub async fn logout<T, S, N, V>(app: &ClientApp<T, S, N, V>) -> Result<(), ClientError>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    let spec = MutationSpec::new(ApiEndpoint::AuthLogout)
        .on_success("Logged out", None)
        .on_error("Logout failed", "Could not log out. Please try again.")
        .invalidates([QueryKey::session()]);
    app.runner().run::<Value>(spec).await?;
    app.refresh_session().await;
    app.navigator().go_to(Route::Login);
    Ok(())
}

/// Only exists for a verified Discord identity; the username comes from that identity and
/// cannot be edited.
#[derive(Clone, PartialEq, Eq)]
pub struct SignupForm {
    identity: DiscordIdentity,
    pub badge_number: String,
    pub rank: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: Option<String>,
    pub callsign: Option<String>,
}

impl std::fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("identity", &self.identity)
            .field("badge_number", &self.badge_number)
            .field("rank", &self.rank)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .field("callsign", &self.callsign)
            .finish()
    }
}

impl SignupForm {
    pub fn new(state: &VerificationState) -> Result<Self, ClientError> {
        let identity = state.identity().ok_or(ClientError::NotVerified)?;
        Ok(Self {
            identity: identity.clone(),
            badge_number: String::new(),
            rank: DEFAULT_RANK.to_string(),
            password: String::new(),
            confirm_password: String::new(),
            full_name: None,
            callsign: None,
        })
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    pub fn identity(&self) -> &DiscordIdentity {
        &self.identity
    }

    pub fn validate(&self) -> Result<SignupRequest, FormErrors> {
        let request = SignupRequest {
            username: self.identity.username.clone(),
            badge_number: self.badge_number.trim().to_string(),
            rank: self.rank.trim().to_string(),
            password: self.password.clone(),
            discord_id: self.identity.id.clone(),
            discord_username: self.identity.username.clone(),
            full_name: non_blank(self.full_name.as_deref()),
            callsign: non_blank(self.callsign.as_deref()),
        };
        request.field_errors(&self.confirm_password).into_result()?;
        Ok(request)
    }

    /// Creates the account, caches the officer profile it implies and refreshes the session.
    pub async fn submit<T, S, N, V>(
        &self,
        app: &ClientApp<T, S, N, V>,
    ) -> Result<SessionUser, ClientError>
    where
        T: ApiTransport,
        S: KvStore,
        N: Notifier,
        V: Navigator,
    {
        if app.verification_state().identity() != Some(&self.identity) {
            return Err(ClientError::NotVerified);
        }
        let request = self.validate()?;
        let spec = MutationSpec::new(ApiEndpoint::AuthSignup)
            .payload(&request)?
            .on_success("Account created", Some("Welcome to the department."))
            .on_error("Signup failed", "Could not create your account. Please try again.")
            .invalidates([QueryKey::session()]);
        let envelope = app.runner().run::<UserEnvelope>(spec).await?;

        let mut profile = OfficerProfile::from_session(&envelope.user);
        if profile.discord_id.is_none() {
            profile.discord_id = Some(self.identity.id.clone());
        }
        match app.store().put_officer_profile(&profile) {
            Ok(()) => info!(badge = %profile.badge, "signup complete"),
            Err(err) => {
                warn!(badge = %profile.badge, error = %err, "account created but profile not cached")
            }
        }

        let user = app.refresh_session().await.unwrap_or(envelope.user);
        app.navigator().go_to(Route::Landing);
        Ok(user)
    }
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShiftLogForm {
    pub shift_date: String,
    pub start_time: String,
    pub end_time: String,
    pub patrol_area: String,
    pub officers: Vec<ShiftLogOfficer>,
    pub notes: String,
}

impl ShiftLogForm {
    /// Starts with the cached officer profile as the first officer, when there is one.
    pub fn seeded<S: KvStore>(store: &ClientStore<S>) -> Result<Self, StorageError> {
        let officers = store
            .officer_profile()?
            .map(|profile| vec![ShiftLogOfficer::from(&profile)])
            .unwrap_or_default();
        Ok(Self {
            officers,
            ..Self::default()
        })
    }

    pub fn from_request(request: ShiftLogRequest) -> Self {
        Self {
            shift_date: request.shift_date,
            start_time: request.start_time,
            end_time: request.end_time,
            patrol_area: request.patrol_area,
            officers: request.officers,
            notes: request.notes,
        }
    }

    /// False when an officer with the same badge is already listed.
    pub fn add_officer(&mut self, officer: ShiftLogOfficer) -> bool {
        let badge = officer.badge.trim();
        if self.officers.iter().any(|o| o.badge.trim() == badge) {
            return false;
        }
        self.officers.push(officer);
        true
    }

    pub fn add_saved_officer(&mut self, profile: &OfficerProfile) -> bool {
        self.add_officer(ShiftLogOfficer::from(profile))
    }

    pub fn remove_officer(&mut self, badge: &str) -> bool {
        let before = self.officers.len();
        self.officers.retain(|o| o.badge.trim() != badge.trim());
        self.officers.len() != before
    }

    pub fn validate(&self) -> Result<ShiftLogRequest, FormErrors> {
        let request = ShiftLogRequest {
            shift_date: self.shift_date.trim().to_string(),
            start_time: self.start_time.trim().to_string(),
            end_time: self.end_time.trim().to_string(),
            patrol_area: self.patrol_area.trim().to_string(),
            officers: self.officers.clone(),
            notes: self.notes.trim().to_string(),
        };
        request.field_errors().into_result()?;
        Ok(request)
    }

    /// Submits for the logged-in officer and remembers everyone listed for the next log.
    pub async fn submit<T, S, N, V>(
        &self,
        app: &ClientApp<T, S, N, V>,
    ) -> Result<ShiftLogRecord, ClientError>
    where
        T: ApiTransport,
        S: KvStore,
        N: Notifier,
        V: Navigator,
    {
        let request = self.validate()?;
        if !app.session().is_authenticated().await {
            app.navigator().go_to(Route::Login);
            return Err(ClientError::NotAuthenticated);
        }
        let summary = format!("{} on {}", request.patrol_area, request.shift_date);
        let spec = MutationSpec::new(ApiEndpoint::ShiftLogs)
            .payload(&request)?
            .on_success("Shift log submitted", Some(summary.as_str()))
            .on_error(
                "Submission failed",
                "Could not submit the shift log. Please try again.",
            );
        let record = app.runner().run::<ShiftLogRecord>(spec).await?;
        info!(id = record.id, officers = request.officers.len(), "shift log created");
        if let Err(err) = remember_officers(app.store(), &request.officers) {
            warn!(id = record.id, error = %err, "shift log created but officer list not saved");
        }
        Ok(record)
    }
}

fn remember_officers<S: KvStore>(
    store: &ClientStore<S>,
    officers: &[ShiftLogOfficer],
) -> Result<(), StorageError> {
    let saved = store.saved_officers()?;
    for officer in officers {
        let discord_id = saved
            .iter()
            .find(|existing| existing.badge == officer.badge)
            .and_then(|existing| existing.discord_id.clone());
        store.upsert_saved_officer(&OfficerProfile {
            badge: officer.badge.trim().to_string(),
            name: officer.name.trim().to_string(),
            rank: match officer.rank.trim() {
                "" => DEFAULT_RANK.to_string(),
                rank => rank.to_string(),
            },
            discord_id,
            callsign: officer.callsign.trim().to_string(),
        })?;
    }
    Ok(())
}
