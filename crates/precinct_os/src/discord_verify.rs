#![forbid(unsafe_code)]

//! Discord verification handshake as seen from the client.
//!
//! The provider redirect drops every in-memory value, so the outcome is rebuilt from the
//! callback URL plus one confirmatory server call. Two redirect shapes are accepted: a
//! flag-style redirect confirmed through the status endpoint, and a code/state pair that is
//! exchanged once (codes are single-use, so the exchange is never retried).

use precinct_contracts::api::{ApiEndpoint, QueryKey};
use precinct_contracts::discord::{
    CallbackQuery, CallbackResult, DiscordCallbackRequest, DiscordCallbackResponse,
    DiscordIdentity, DiscordStatusResponse, DiscordUrlResponse, DiscordVerifiedRecord,
    VerificationFailure, VerificationState,
};
use precinct_contracts::UnixTimeMs;
use precinct_engines::discord_flow::{failed_display_delay, VerificationEvent};
use precinct_engines::error::read_response;
use precinct_engines::{ApiError, ApiRequest, ApiTransport, MutationSpec, Notice, Notifier};
use precinct_storage::KvStore;
use serde_json::Value;
use tracing::{debug, warn};

use crate::app::ClientApp;
use crate::error::ClientError;
use crate::navigator::{Navigator, Route};

pub struct DiscordVerification<'a, T, S, N, V>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    app: &'a ClientApp<T, S, N, V>,
}

impl<'a, T, S, N, V> DiscordVerification<'a, T, S, N, V>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    pub fn new(app: &'a ClientApp<T, S, N, V>) -> Self {
        Self { app }
    }

    pub fn state(&self) -> VerificationState {
        self.app.verification_state()
    }

    /// Picks up a verified identity cached by an earlier run.
    pub fn restore(&self) -> Result<VerificationState, ClientError> {
        match self.app.store().discord_verified()? {
            Some(record) => Ok(self
                .app
                .apply_verification(VerificationEvent::Restored(record.user))),
            None => Ok(self.state()),
        }
    }

    /// Asks the server for the authorization URL and leaves for the provider.
    pub async fn initiate(&self) -> Result<String, ClientError> {
        if self.state().is_verified() {
            return Err(ClientError::AlreadyVerified);
        }
        let outcome = self
            .app
            .transport()
            .send(ApiRequest::endpoint(ApiEndpoint::DiscordUrl))
            .await;
        let url = match read_response::<DiscordUrlResponse>(outcome) {
            Ok(body) if !body.url.trim().is_empty() => body.url,
            Ok(_) => {
                let err = ApiError::Decode {
                    status: 200,
                    reason: "authorization url is empty".to_string(),
                };
                return Err(self.report_start_failure(err));
            }
            Err(err) => return Err(self.report_start_failure(err)),
        };
        self.app.apply_verification(VerificationEvent::Initiated);
        self.app
            .notifier()
            .notify(Notice::info("Redirecting to Discord", None));
        self.app.navigator().open_external(&url);
        Ok(url)
    }

    /// Resolves the provider redirect. A failed state stays visible until
    /// [`settle_failure`](Self::settle_failure) runs.
    pub async fn handle_callback(&self, raw_url: &str) -> Result<VerificationState, ClientError> {
        let result = match CallbackQuery::parse(raw_url) {
            CallbackQuery::ProviderError(reason) => CallbackResult::Failure(reason),
            CallbackQuery::Malformed => CallbackResult::Malformed,
            CallbackQuery::CodeExchange { code, state } => self.exchange_code(code, state).await,
            CallbackQuery::StatusCheck => match self.fetch_status().await {
                Ok(status) => CallbackResult::from_status(status),
                Err(err) => {
                    warn!(error = %err, "verification status check failed");
                    CallbackResult::Failure(VerificationFailure::StatusUnconfirmed)
                }
            },
        };

        match &result {
            CallbackResult::Success(identity) => {
                self.remember(identity)?;
                self.app.notifier().notify(Notice::success(
                    "Discord verified",
                    Some(format!("Verified as {}", identity.display_tag())),
                ));
            }
            CallbackResult::Failure(reason) => {
                self.app
                    .notifier()
                    .notify(Notice::error("Verification failed", reason.message()));
            }
            CallbackResult::Malformed => {
                self.app.notifier().notify(Notice::error(
                    "Verification failed",
                    VerificationFailure::AuthFailed.message(),
                ));
            }
        }

        let state = self
            .app
            .apply_verification(VerificationEvent::CallbackResolved(result));
        if state.is_verified() {
            self.app.navigator().go_to(Route::Signup);
        }
        Ok(state)
    }

    /// Holds a failure on screen for the display delay, then returns to the signup form.
    /// No-op unless the handshake failed.
    pub async fn settle_failure(&self) -> VerificationState {
        if !matches!(self.state(), VerificationState::Failed(_)) {
            return self.state();
        }
        tokio::time::sleep(failed_display_delay()).await;
        let state = self
            .app
            .apply_verification(VerificationEvent::FailureDisplayElapsed);
        self.app.navigator().go_to(Route::Signup);
        state
    }

    /// Re-reads verification from the server. The cached identity is only rewritten when the
    /// server reports a different one.
    pub async fn refresh_status(&self) -> Result<VerificationState, ClientError> {
        let status = self.fetch_status().await?;
        match status {
            DiscordStatusResponse {
                verified: true,
                user: Some(identity),
            } => {
                self.remember(&identity)?;
                Ok(self
                    .app
                    .apply_verification(VerificationEvent::StatusConfirmed(identity)))
            }
            _ => {
                if self.app.store().clear_discord_verified()? {
                    debug!("cached discord verification dropped");
                }
                Ok(self.app.apply_verification(VerificationEvent::StatusCleared))
            }
        }
    }

    /// Only a successful server call leaves the verified state.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        if !self.state().is_verified() {
            return Err(ClientError::NotVerified);
        }
        let spec = MutationSpec::new(ApiEndpoint::DiscordDisconnect)
            .on_success("Discord disconnected", None)
            .on_error("Disconnect failed", "Could not disconnect your Discord account.")
            .invalidates([QueryKey::discord_status()]);
        match self.app.runner().run::<Value>(spec).await {
            Ok(_) => {
                self.app.store().clear_discord_verified()?;
                self.app
                    .apply_verification(VerificationEvent::DisconnectSucceeded);
                Ok(())
            }
            Err(err) => {
                self.app.apply_verification(VerificationEvent::DisconnectFailed);
                Err(err.into())
            }
        }
    }

    async fn fetch_status(&self) -> Result<DiscordStatusResponse, ApiError> {
        let outcome = self
            .app
            .transport()
            .send(ApiRequest::endpoint(ApiEndpoint::DiscordStatus))
            .await;
        let status = read_response::<DiscordStatusResponse>(outcome)?;
        self.app.cache().put(&QueryKey::discord_status(), &status);
        Ok(status)
    }

    async fn exchange_code(&self, code: String, state: String) -> CallbackResult {
        let request = match ApiRequest::endpoint(ApiEndpoint::DiscordCallback)
            .with_json(&DiscordCallbackRequest { code, state })
        {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "callback exchange not encodable");
                return CallbackResult::Failure(VerificationFailure::AuthFailed);
            }
        };
        let outcome = self.app.transport().send(request).await;
        match read_response::<DiscordCallbackResponse>(outcome) {
            Ok(body) => CallbackResult::Success(body.user),
            Err(err) => {
                warn!(status = ?err.status(), error = %err, "discord code exchange failed");
                CallbackResult::Failure(VerificationFailure::AuthFailed)
            }
        }
    }

    fn remember(&self, identity: &DiscordIdentity) -> Result<(), ClientError> {
        let store = self.app.store();
        let unchanged = store
            .discord_verified()?
            .is_some_and(|record| record.user == *identity);
        if !unchanged {
            store.put_discord_verified(&DiscordVerifiedRecord::v1(
                identity.clone(),
                UnixTimeMs::now(),
            ))?;
            debug!(discord_id = %identity.id, "discord identity cached");
        }
        Ok(())
    }

    fn report_start_failure(&self, err: ApiError) -> ClientError {
        self.app.notifier().notify(Notice::error(
            "Discord verification",
            err.user_message("Could not start Discord verification. Please try again."),
        ));
        err.into()
    }
}
