#![forbid(unsafe_code)]

use precinct_contracts::auth::ApiMessage;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::transport::{ApiResponse, TransportError};

const RAW_BODY_PREVIEW_CHARS: usize = 200;

/// Failure of one API exchange. Only `Server` can carry a message meant for the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("{}", server_error_text(.status, .message, .raw))]
    Server {
        status: u16,
        message: Option<String>,
        raw: String,
    },
    /// No answer at all.
    #[error("network error ({}): {}", .0.name, .0.message)]
    Transport(#[from] TransportError),
    /// 2xx with a body we could not read; never retried.
    #[error("unexpected response from server (status {status}): {reason}")]
    Decode { status: u16, reason: String },
}

fn server_error_text(status: &u16, message: &Option<String>, raw: &str) -> String {
    match message {
        Some(message) => message.clone(),
        None => {
            let preview = raw.chars().take(RAW_BODY_PREVIEW_CHARS).collect::<String>();
            if preview.trim().is_empty() {
                format!("request failed with status {status}")
            } else {
                format!("request failed with status {status}: {}", preview.trim())
            }
        }
    }
}

impl ApiError {
    pub fn from_failed_response(response: &ApiResponse) -> Self {
        let message = serde_json::from_str::<ApiMessage>(&response.body)
            .ok()
            .map(|m| m.message)
            .filter(|m| !m.trim().is_empty());
        Self::Server {
            status: response.status,
            message,
            raw: response.body.clone(),
        }
    }

    /// Only server answers can carry a message meant for the user.
    pub fn structured_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => message.as_deref(),
            Self::Transport(_) | Self::Decode { .. } => None,
        }
    }

    pub fn user_message(&self, default: &str) -> String {
        self.structured_message()
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } | Self::Decode { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

/// Parses a 2xx body; an empty body reads as JSON `null`.
pub fn decode_json_body<R: DeserializeOwned>(response: &ApiResponse) -> Result<R, ApiError> {
    let body = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };
    serde_json::from_str(body).map_err(|err| ApiError::Decode {
        status: response.status,
        reason: err.to_string(),
    })
}

/// Single exchange without retries, for reads.
pub fn read_response<R: DeserializeOwned>(
    outcome: Result<ApiResponse, TransportError>,
) -> Result<R, ApiError> {
    let response = outcome?;
    if !response.is_success() {
        return Err(ApiError::from_failed_response(&response));
    }
    decode_json_body(&response)
}
