#![forbid(unsafe_code)]

use precinct_contracts::FormErrors;
use precinct_engines::ApiError;
use precinct_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Caught before any network call; shown inline per field.
    #[error("invalid input: {0}")]
    Validation(#[from] FormErrors),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("local storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("could not encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Discord verification is required before signing up")]
    NotVerified,
    #[error("Discord account is already verified")]
    AlreadyVerified,
    #[error("you are not logged in")]
    NotAuthenticated,
}

impl ClientError {
    pub fn field_errors(&self) -> Option<&FormErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
