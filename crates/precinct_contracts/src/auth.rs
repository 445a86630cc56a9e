#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::require_text;
use crate::{ContractViolation, FormErrors};

pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const BADGE_MAX_LEN: usize = 16;
pub const RANK_MAX_LEN: usize = 32;

/// Identity returned by `/api/auth/me`. A cached read of server state; the client
/// never creates or destroys it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    pub badge_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: SessionUser,
}

/// `/api/auth/me` has been observed both wrapped in `{user}` and bare.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MeResponse {
    Wrapped(UserEnvelope),
    Bare(SessionUser),
}

impl MeResponse {
    pub fn into_user(self) -> SessionUser {
        match self {
            Self::Wrapped(envelope) => envelope.user,
            Self::Bare(user) => user,
        }
    }
}

/// Structured error body (`{"message": "..."}`) the server sends with failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub message: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginRequest {
    pub fn field_errors(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.check(require_text("username", &self.username, USERNAME_MAX_LEN));
        if self.password.is_empty() {
            errors.push(ContractViolation::InvalidValue {
                field: "password",
                reason: "is required",
            });
        }
        errors
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub badge_number: String,
    pub rank: String,
    pub password: String,
    pub discord_id: String,
    pub discord_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("username", &self.username)
            .field("badge_number", &self.badge_number)
            .field("rank", &self.rank)
            .field("password", &"<redacted>")
            .field("discord_id", &self.discord_id)
            .field("discord_username", &self.discord_username)
            .field("full_name", &self.full_name)
            .field("callsign", &self.callsign)
            .finish()
    }
}

impl SignupRequest {
    pub fn field_errors(&self, confirm_password: &str) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.check(require_text("username", &self.username, USERNAME_MAX_LEN));
        errors.check(validate_badge_number(&self.badge_number));
        errors.check(require_text("rank", &self.rank, RANK_MAX_LEN));
        let password_len = self.password.chars().count();
        if password_len < PASSWORD_MIN_LEN {
            errors.push(ContractViolation::InvalidValue {
                field: "password",
                reason: "must be at least 8 characters",
            });
        } else if password_len > PASSWORD_MAX_LEN {
            errors.push(ContractViolation::InvalidValue {
                field: "password",
                reason: "must be at most 128 characters",
            });
        }
        if confirm_password != self.password {
            errors.push(ContractViolation::InvalidValue {
                field: "confirmPassword",
                reason: "passwords do not match",
            });
        }
        if self.discord_id.trim().is_empty() {
            errors.push(ContractViolation::InvalidValue {
                field: "discordId",
                reason: "Discord verification is required",
            });
        }
        errors
    }
}

pub fn validate_badge_number(raw: &str) -> Result<(), ContractViolation> {
    require_text("badgeNumber", raw, BADGE_MAX_LEN)?;
    if !raw
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ContractViolation::InvalidValue {
            field: "badgeNumber",
            reason: "must contain only letters, digits and '-'",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> SignupRequest {
        SignupRequest {
            username: "jdoe".to_string(),
            badge_number: "A-1021".to_string(),
            rank: "Sergeant".to_string(),
            password: "hunter2hunter2".to_string(),
            discord_id: "80351110224678912".to_string(),
            discord_username: "jdoe".to_string(),
            full_name: None,
            callsign: Some("2-ADAM-12".to_string()),
        }
    }

    #[test]
    fn at_auth_01_me_response_accepts_wrapped_and_bare_shapes() {
        let bare = r#"{"id":7,"username":"jdoe","isAdmin":false,"badgeNumber":"1021","rank":"Sergeant"}"#;
        let wrapped = format!(r#"{{"user":{bare}}}"#);
        let a = serde_json::from_str::<MeResponse>(bare).unwrap().into_user();
        let b = serde_json::from_str::<MeResponse>(&wrapped).unwrap().into_user();
        assert_eq!(a, b);
        assert_eq!(a.rank.as_deref(), Some("Sergeant"));
        assert_eq!(a.callsign, None);
    }

    #[test]
    fn at_auth_02_login_requires_both_fields() {
        let errors = LoginRequest {
            username: " ".to_string(),
            password: String::new(),
        }
        .field_errors();
        assert_eq!(errors.fields(), vec!["username", "password"]);
    }

    #[test]
    fn at_auth_03_signup_checks_password_confirmation_and_badge() {
        assert!(signup().field_errors("hunter2hunter2").is_empty());

        let mut bad = signup();
        bad.badge_number = "A 1021".to_string();
        let errors = bad.field_errors("different");
        assert_eq!(errors.fields(), vec!["badgeNumber", "confirmPassword"]);
    }

    #[test]
    fn at_auth_04_debug_output_never_contains_password() {
        let rendered = format!("{:?}", signup());
        assert!(!rendered.contains("hunter2"));
        let login = LoginRequest {
            username: "jdoe".to_string(),
            password: "SENTINEL_PW".to_string(),
        };
        assert!(!format!("{login:?}").contains("SENTINEL_PW"));
    }

    #[test]
    fn at_auth_05_signup_serializes_camel_case_wire_names() {
        let value = serde_json::to_value(signup()).unwrap();
        assert_eq!(value["badgeNumber"], "A-1021");
        assert_eq!(value["discordUsername"], "jdoe");
        assert!(value.get("fullName").is_none());
    }
}
