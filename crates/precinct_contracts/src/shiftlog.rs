#![forbid(unsafe_code)]

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::auth::validate_badge_number;
use crate::common::require_text;
use crate::profile::OfficerProfile;
use crate::{ContractViolation, FormErrors};

pub const SHIFT_LOG_MIN_OFFICERS: usize = 1;
pub const SHIFT_LOG_MAX_OFFICERS: usize = 12;
pub const SHIFT_LOG_NOTES_MAX_LEN: usize = 2_000;
pub const PATROL_AREA_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftLogOfficer {
    pub badge: String,
    pub name: String,
    #[serde(default)]
    pub rank: String,
    #[serde(default)]
    pub callsign: String,
}

impl From<&OfficerProfile> for ShiftLogOfficer {
    fn from(profile: &OfficerProfile) -> Self {
        Self {
            badge: profile.badge.clone(),
            name: profile.name.clone(),
            rank: profile.rank.clone(),
            callsign: profile.callsign.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftLogRequest {
    /// `YYYY-MM-DD`
    pub shift_date: String,
    /// `HH:MM`, 24h
    pub start_time: String,
    pub end_time: String,
    pub patrol_area: String,
    pub officers: Vec<ShiftLogOfficer>,
    #[serde(default)]
    pub notes: String,
}

/// Record echoed back by `POST /api/shift-logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftLogRecord {
    pub id: i64,
    #[serde(flatten)]
    pub entry: ShiftLogRequest,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ShiftLogRequest {
    pub fn field_errors(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        if NaiveDate::parse_from_str(self.shift_date.trim(), "%Y-%m-%d").is_err() {
            errors.push(ContractViolation::InvalidValue {
                field: "shiftDate",
                reason: "must be a date in YYYY-MM-DD form",
            });
        }
        let start = parse_clock("startTime", &self.start_time);
        let end = parse_clock("endTime", &self.end_time);
        match (start, end) {
            // Overnight shifts are fine; a zero-length shift is not.
            (Ok(start), Ok(end)) if start == end => errors.push(ContractViolation::InvalidValue {
                field: "endTime",
                reason: "must differ from the start time",
            }),
            (start, end) => {
                errors.check(start.map(|_| ()));
                errors.check(end.map(|_| ()));
            }
        }
        errors.check(require_text(
            "patrolArea",
            &self.patrol_area,
            PATROL_AREA_MAX_LEN,
        ));
        let officer_count = self.officers.len();
        if officer_count < SHIFT_LOG_MIN_OFFICERS {
            errors.push(ContractViolation::InvalidValue {
                field: "officers",
                reason: "at least one officer is required",
            });
        } else if officer_count > SHIFT_LOG_MAX_OFFICERS {
            errors.push(ContractViolation::InvalidRange {
                field: "officers",
                min: SHIFT_LOG_MIN_OFFICERS as f64,
                max: SHIFT_LOG_MAX_OFFICERS as f64,
                got: officer_count as f64,
            });
        }
        for officer in &self.officers {
            if let Err(violation) = validate_badge_number(&officer.badge) {
                errors.push(ContractViolation::InvalidValue {
                    field: "officers",
                    reason: match violation {
                        ContractViolation::InvalidValue { reason, .. } => reason,
                        ContractViolation::InvalidRange { .. } => "badge number is too long",
                    },
                });
            }
            if officer.name.trim().is_empty() {
                errors.push(ContractViolation::InvalidValue {
                    field: "officers",
                    reason: "every officer needs a name",
                });
            }
        }
        let mut badges = self
            .officers
            .iter()
            .map(|o| o.badge.trim())
            .collect::<Vec<_>>();
        badges.sort_unstable();
        if badges.windows(2).any(|w| w[0] == w[1]) {
            errors.push(ContractViolation::InvalidValue {
                field: "officers",
                reason: "an officer may only be listed once",
            });
        }
        if self.notes.chars().count() > SHIFT_LOG_NOTES_MAX_LEN {
            errors.push(ContractViolation::InvalidRange {
                field: "notes",
                min: 0.0,
                max: SHIFT_LOG_NOTES_MAX_LEN as f64,
                got: self.notes.chars().count() as f64,
            });
        }
        errors
    }
}

fn parse_clock(field: &'static str, raw: &str) -> Result<NaiveTime, ContractViolation> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| ContractViolation::InvalidValue {
        field,
        reason: "must be a time in HH:MM form",
    })
}
