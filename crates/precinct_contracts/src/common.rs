#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct UnixTimeMs(pub i64);

impl UnixTimeMs {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis().max(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
}

impl ContractViolation {
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidValue { field, .. } | Self::InvalidRange { field, .. } => field,
        }
    }
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => write!(f, "{field}: {reason}"),
            Self::InvalidRange {
                field,
                min,
                max,
                got,
            } => write!(f, "{field}: must be within {min}..={max} (got {got})"),
        }
    }
}

impl std::error::Error for ContractViolation {}

/// Inline per-field errors for a form. Only the first violation for a field is kept,
/// which is the one rendered next to that field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormErrors {
    violations: Vec<ContractViolation>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: ContractViolation) {
        if self.for_field(violation.field()).is_none() {
            self.violations.push(violation);
        }
    }

    pub fn check(&mut self, result: Result<(), ContractViolation>) {
        if let Err(violation) = result {
            self.push(violation);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn for_field(&self, field: &str) -> Option<&ContractViolation> {
        self.violations.iter().find(|v| v.field() == field)
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(ContractViolation::field).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractViolation> {
        self.violations.iter()
    }

    pub fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for FormErrors {}

pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "is required",
        });
    }
    if value.chars().count() > max_len {
        return Err(ContractViolation::InvalidRange {
            field,
            min: 1.0,
            max: max_len as f64,
            got: value.chars().count() as f64,
        });
    }
    Ok(())
}
