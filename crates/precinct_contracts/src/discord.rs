#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::UnixTimeMs;

pub const ERROR_INSUFFICIENT_ROLE: &str = "insufficient_role";
pub const ERROR_NOT_MEMBER: &str = "not_member";
pub const ERROR_NOT_IN_GUILD: &str = "not_in_guild";
pub const ERROR_AUTH_FAILED: &str = "auth_failed";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscordIdentity {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
}

impl DiscordIdentity {
    /// `name#1234` for legacy accounts, plain `name` once Discord dropped discriminators.
    pub fn display_tag(&self) -> String {
        match self.discriminator.trim() {
            "" | "0" => self.username.clone(),
            disc => format!("{}#{}", self.username, disc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordUrlResponse {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordStatusResponse {
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub user: Option<DiscordIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordCallbackRequest {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordCallbackResponse {
    pub user: DiscordIdentity,
}

/// Durable record stored under `discordVerified` once the handshake completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordVerifiedRecord {
    pub verified: bool,
    pub user: DiscordIdentity,
    pub timestamp: UnixTimeMs,
}

impl DiscordVerifiedRecord {
    pub fn v1(user: DiscordIdentity, timestamp: UnixTimeMs) -> Self {
        Self {
            verified: true,
            user,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    InsufficientRole,
    NotMember,
    AuthFailed,
    /// Status endpoint did not confirm a verified identity.
    StatusUnconfirmed,
    /// Provider reported something we have no copy for; shown verbatim.
    Provider(String),
}

impl VerificationFailure {
    pub fn from_error_code(raw: &str) -> Self {
        match raw.trim() {
            ERROR_INSUFFICIENT_ROLE => Self::InsufficientRole,
            ERROR_NOT_MEMBER | ERROR_NOT_IN_GUILD => Self::NotMember,
            ERROR_AUTH_FAILED => Self::AuthFailed,
            other => Self::Provider(other.to_string()),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::InsufficientRole => {
                "You need the LEO role in the department Discord server to sign up.".to_string()
            }
            Self::NotMember => {
                "You must be a member of the department Discord server to sign up.".to_string()
            }
            Self::AuthFailed => "Discord authentication failed. Please try again.".to_string(),
            Self::StatusUnconfirmed => {
                "Discord verification could not be confirmed. Please try again.".to_string()
            }
            Self::Provider(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationState {
    Unverified,
    Pending,
    Verified(DiscordIdentity),
    Failed(VerificationFailure),
}

impl VerificationState {
    pub fn identity(&self) -> Option<&DiscordIdentity> {
        match self {
            Self::Verified(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Pending => "pending",
            Self::Verified(_) => "verified",
            Self::Failed(_) => "failed",
        }
    }
}

/// What the provider redirect carried, parsed once at route entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackQuery {
    ProviderError(VerificationFailure),
    CodeExchange { code: String, state: String },
    /// Flag-style redirect (`verified=…` or no parameters): confirm with the status endpoint.
    StatusCheck,
    Malformed,
}

impl CallbackQuery {
    /// Accepts an absolute URL, a route with a query (`/auth/discord/callback?…`) or a bare query
    /// string (`?error=…`).
    pub fn parse(raw: &str) -> Self {
        let Some(url) = parse_callback_url(raw) else {
            return Self::Malformed;
        };
        let mut error = None;
        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            let value = value.trim().to_string();
            match key.as_ref() {
                "error" if !value.is_empty() => error = Some(value),
                "code" if !value.is_empty() => code = Some(value),
                "state" if !value.is_empty() => state = Some(value),
                _ => {}
            }
        }
        if let Some(error) = error {
            return Self::ProviderError(VerificationFailure::from_error_code(&error));
        }
        match (code, state) {
            (Some(code), Some(state)) => Self::CodeExchange { code, state },
            (None, None) => Self::StatusCheck,
            _ => Self::Malformed,
        }
    }
}

fn parse_callback_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if let Ok(url) = Url::parse(raw) {
        return Some(url);
    }
    let base = Url::parse("http://localhost/auth/discord/callback").ok()?;
    base.join(raw).ok()
}

/// Outcome of the callback once any confirmatory server round-trip is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Success(DiscordIdentity),
    Failure(VerificationFailure),
    Malformed,
}

impl CallbackResult {
    pub fn from_status(status: DiscordStatusResponse) -> Self {
        match status {
            DiscordStatusResponse {
                verified: true,
                user: Some(user),
            } => Self::Success(user),
            _ => Self::Failure(VerificationFailure::StatusUnconfirmed),
        }
    }
}
