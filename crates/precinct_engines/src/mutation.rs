#![forbid(unsafe_code)]

//! Retry-wrapped state-changing API calls.
//!
//! Every mutation gets at most [`MUTATION_MAX_ATTEMPTS`] attempts with linear backoff
//! (`1000 ms × attempt`). Server failures and transport failures retry under the same
//! policy; a success stops the loop at once. The query layer never retries on its own,
//! so attempt accounting lives here only.

use std::time::Duration;

use precinct_contracts::api::{ApiEndpoint, HttpMethod, QueryKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{decode_json_body, ApiError};
use crate::notify::{Notice, Notifier};
use crate::query_cache::QueryCache;
use crate::transport::{ApiRequest, ApiTransport};

pub const MUTATION_MAX_ATTEMPTS: u32 = 3;
pub const MUTATION_BACKOFF_STEP_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl MutationPolicy {
    pub fn v1() -> Self {
        Self {
            max_attempts: MUTATION_MAX_ATTEMPTS,
            backoff_step: Duration::from_millis(MUTATION_BACKOFF_STEP_MS),
        }
    }

    /// Delay between attempt `attempt` and `attempt + 1`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self::v1()
    }
}

/// One state-changing call plus the feedback and cache effects around it.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationSpec {
    pub method: HttpMethod,
    pub path: String,
    pub payload: Option<Value>,
    pub success_title: String,
    pub success_description: Option<String>,
    pub error_title: String,
    pub default_error_message: String,
    pub invalidate: Vec<QueryKey>,
}

impl MutationSpec {
    pub fn new(endpoint: ApiEndpoint) -> Self {
        Self {
            method: endpoint.method(),
            path: endpoint.path().to_string(),
            payload: None,
            success_title: "Success".to_string(),
            success_description: None,
            error_title: "Error".to_string(),
            default_error_message: "Something went wrong. Please try again.".to_string(),
            invalidate: Vec::new(),
        }
    }

    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn on_success(mut self, title: &str, description: Option<&str>) -> Self {
        self.success_title = title.to_string();
        self.success_description = description.map(str::to_string);
        self
    }

    pub fn on_error(mut self, title: &str, default_message: &str) -> Self {
        self.error_title = title.to_string();
        self.default_error_message = default_message.to_string();
        self
    }

    pub fn invalidates(mut self, keys: impl IntoIterator<Item = QueryKey>) -> Self {
        self.invalidate.extend(keys);
        self
    }
}

/// Bookkeeping for one invocation; dropped when the invocation ends.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationAttempt {
    pub path: String,
    pub attempt: u32,
    pub max_attempts: u32,
}

pub struct MutationRunner<'a, T: ApiTransport, N: Notifier> {
    transport: &'a T,
    cache: &'a QueryCache,
    notifier: &'a N,
    policy: MutationPolicy,
}

impl<'a, T: ApiTransport, N: Notifier> MutationRunner<'a, T, N> {
    pub fn new(transport: &'a T, cache: &'a QueryCache, notifier: &'a N) -> Self {
        Self {
            transport,
            cache,
            notifier,
            policy: MutationPolicy::v1(),
        }
    }

    pub fn with_policy(mut self, policy: MutationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn run<R: DeserializeOwned>(&self, spec: MutationSpec) -> Result<R, ApiError> {
        self.run_with(spec, |_| {}).await
    }

    /// Runs the mutation; on success notifies, invalidates `spec.invalidate`, then hands the
    /// parsed result to `on_complete`. On final failure notifies with the server's message or
    /// `spec.default_error_message`.
    pub async fn run_with<R, F>(&self, spec: MutationSpec, on_complete: F) -> Result<R, ApiError>
    where
        R: DeserializeOwned,
        F: FnOnce(&R),
    {
        match self.execute::<R>(&spec).await {
            Ok(result) => {
                self.notifier.notify(Notice::success(
                    spec.success_title.clone(),
                    spec.success_description.clone(),
                ));
                self.cache.invalidate(&spec.invalidate);
                on_complete(&result);
                Ok(result)
            }
            Err(err) => {
                self.notifier.notify(Notice::error(
                    spec.error_title.clone(),
                    err.user_message(&spec.default_error_message),
                ));
                Err(err)
            }
        }
    }

    async fn execute<R: DeserializeOwned>(&self, spec: &MutationSpec) -> Result<R, ApiError> {
        let mut record = MutationAttempt {
            path: spec.path.clone(),
            attempt: 0,
            max_attempts: self.policy.max_attempts.max(1),
        };
        loop {
            record.attempt += 1;
            let request = ApiRequest {
                method: spec.method,
                path: spec.path.clone(),
                body: spec.payload.clone(),
            };
            debug!(
                path = %record.path,
                attempt = record.attempt,
                max_attempts = record.max_attempts,
                "mutation attempt"
            );
            let failure = match self.transport.send(request).await {
                Ok(response) if response.is_success() => return decode_json_body(&response),
                Ok(response) => ApiError::from_failed_response(&response),
                Err(transport) => {
                    warn!(
                        path = %record.path,
                        attempt = record.attempt,
                        name = %transport.name,
                        detail = %transport.detail,
                        "mutation transport failure"
                    );
                    ApiError::Transport(transport)
                }
            };
            if record.attempt >= record.max_attempts {
                error!(
                    path = %record.path,
                    attempts = record.attempt,
                    error = %failure,
                    "mutation failed after final attempt"
                );
                return Err(failure);
            }
            let delay = self.policy.backoff_after(record.attempt);
            warn!(
                path = %record.path,
                attempt = record.attempt,
                status = ?failure.status(),
                delay_ms = delay.as_millis() as u64,
                "mutation attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
