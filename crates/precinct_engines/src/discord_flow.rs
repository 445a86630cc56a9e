#![forbid(unsafe_code)]

//! Discord verification handshake as a pure state machine.
//!
//! ```text
//! Unverified --Initiated--> Pending --CallbackResolved(Success)--> Verified
//!                                  \--CallbackResolved(Failure)--> Failed --FailureDisplayElapsed--> Unverified
//! Verified --DisconnectSucceeded--> Unverified
//! ```
//!
//! The redirect to the provider drops in-memory state, so a callback is accepted from any
//! non-verified state: the outcome is rebuilt from the URL plus one server confirmation.

use std::time::Duration;

use precinct_contracts::discord::{
    CallbackResult, DiscordIdentity, VerificationFailure, VerificationState,
};

pub const FAILED_DISPLAY_DELAY_MS: u64 = 3_000;

pub fn failed_display_delay() -> Duration {
    Duration::from_millis(FAILED_DISPLAY_DELAY_MS)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    Initiated,
    CallbackResolved(CallbackResult),
    FailureDisplayElapsed,
    /// Status endpoint reported a verified identity outside the callback route.
    StatusConfirmed(DiscordIdentity),
    /// Status endpoint reported no verification.
    StatusCleared,
    /// Identity read back from durable storage on startup.
    Restored(DiscordIdentity),
    DisconnectSucceeded,
    DisconnectFailed,
}

pub fn transition(state: &VerificationState, event: VerificationEvent) -> VerificationState {
    use VerificationEvent as E;
    use VerificationState as S;

    match (state, event) {
        (S::Verified(_), E::Initiated) => state.clone(),
        (_, E::Initiated) => S::Pending,

        (_, E::CallbackResolved(CallbackResult::Success(identity))) => S::Verified(identity),
        // Verified is terminal for the handshake; a stray failing callback does not undo it.
        (S::Verified(_), E::CallbackResolved(_)) => state.clone(),
        (_, E::CallbackResolved(CallbackResult::Failure(reason))) => S::Failed(reason),
        (_, E::CallbackResolved(CallbackResult::Malformed)) => {
            S::Failed(VerificationFailure::AuthFailed)
        }

        (S::Failed(_), E::FailureDisplayElapsed) => S::Unverified,
        (_, E::FailureDisplayElapsed) => state.clone(),

        (S::Pending | S::Failed(_), E::StatusConfirmed(_)) => state.clone(),
        (_, E::StatusConfirmed(identity)) => S::Verified(identity),
        (S::Verified(_), E::StatusCleared) => S::Unverified,
        (_, E::StatusCleared) => state.clone(),

        (S::Unverified, E::Restored(identity)) => S::Verified(identity),
        (_, E::Restored(_)) => state.clone(),

        (S::Verified(_), E::DisconnectSucceeded) => S::Unverified,
        (_, E::DisconnectSucceeded | E::DisconnectFailed) => state.clone(),
    }
}
