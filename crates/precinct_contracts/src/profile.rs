#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::auth::{validate_badge_number, SessionUser, RANK_MAX_LEN};
use crate::common::require_text;
use crate::FormErrors;

pub const DEFAULT_RANK: &str = "Officer";
pub const CALLSIGN_MAX_LEN: usize = 24;

/// Officer identity kept in durable client storage under `officerProfile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficerProfile {
    pub badge: String,
    pub name: String,
    #[serde(default = "default_rank")]
    pub rank: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<String>,
    #[serde(default)]
    pub callsign: String,
}

fn default_rank() -> String {
    DEFAULT_RANK.to_string()
}

impl OfficerProfile {
    pub fn from_session(session: &SessionUser) -> Self {
        Self {
            badge: session.badge_number.clone(),
            name: session
                .full_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| session.username.clone()),
            rank: rank_or_default(session.rank.as_deref()),
            discord_id: session.discord_id.clone(),
            callsign: session.callsign.clone().unwrap_or_default(),
        }
    }

    /// Session is authoritative for rank and callsign once the Discord ids match.
    /// Returns `None` when the profile is not linked to this session.
    pub fn synced_from_session(&self, session: &SessionUser) -> Option<Self> {
        let (Some(ours), Some(theirs)) = (self.discord_id.as_deref(), session.discord_id.as_deref())
        else {
            return None;
        };
        if ours != theirs {
            return None;
        }
        Some(Self {
            rank: rank_or_default(session.rank.as_deref()),
            callsign: session.callsign.clone().unwrap_or_default(),
            ..self.clone()
        })
    }

    pub fn field_errors(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.check(validate_badge_number(&self.badge));
        errors.check(require_text("name", &self.name, 64));
        errors.check(require_text("rank", &self.rank, RANK_MAX_LEN));
        if self.callsign.chars().count() > CALLSIGN_MAX_LEN {
            errors.push(crate::ContractViolation::InvalidValue {
                field: "callsign",
                reason: "must be at most 24 characters",
            });
        }
        errors
    }
}

fn rank_or_default(rank: Option<&str>) -> String {
    rank.map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_RANK)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(discord_id: Option<&str>, rank: Option<&str>, callsign: Option<&str>) -> SessionUser {
        SessionUser {
            id: 3,
            username: "jdoe".to_string(),
            is_admin: false,
            badge_number: "1021".to_string(),
            full_name: Some("Jane Doe".to_string()),
            rank: rank.map(str::to_string),
            discord_id: discord_id.map(str::to_string),
            callsign: callsign.map(str::to_string),
        }
    }

    fn profile(discord_id: Option<&str>) -> OfficerProfile {
        OfficerProfile {
            badge: "1021".to_string(),
            name: "Jane Doe".to_string(),
            rank: "Corporal".to_string(),
            discord_id: discord_id.map(str::to_string),
            callsign: "1-L-20".to_string(),
        }
    }

    #[test]
    fn at_profile_01_matching_ids_take_rank_and_callsign_from_session() {
        let synced = profile(Some("99"))
            .synced_from_session(&session(Some("99"), Some("Sergeant"), Some("2-A-12")))
            .unwrap();
        assert_eq!(synced.rank, "Sergeant");
        assert_eq!(synced.callsign, "2-A-12");
        assert_eq!(synced.name, "Jane Doe");
    }

    #[test]
    fn at_profile_02_absent_session_fields_fall_back() {
        let synced = profile(Some("99"))
            .synced_from_session(&session(Some("99"), None, None))
            .unwrap();
        assert_eq!(synced.rank, DEFAULT_RANK);
        assert_eq!(synced.callsign, "");
    }

    #[test]
    fn at_profile_03_unlinked_profiles_are_left_alone() {
        let s = session(Some("99"), Some("Sergeant"), Some("2-A-12"));
        assert_eq!(profile(Some("11")).synced_from_session(&s), None);
        assert_eq!(profile(None).synced_from_session(&s), None);
        assert_eq!(
            profile(Some("99")).synced_from_session(&session(None, None, None)),
            None
        );
    }

    #[test]
    fn at_profile_04_stored_json_without_rank_reads_default() {
        let p: OfficerProfile =
            serde_json::from_str(r#"{"badge":"77","name":"Sam Roe"}"#).unwrap();
        assert_eq!(p.rank, DEFAULT_RANK);
        assert_eq!(p.callsign, "");
        assert_eq!(p.discord_id, None);
    }
}
