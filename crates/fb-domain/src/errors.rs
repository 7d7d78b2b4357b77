//! Thrown domain errors
//!
//! These are programmer-level failures, distinct from the structured
//! [`crate::envelope::ErrorEnvelope`] protocol outcomes. Transports map
//! them to `internal_error` with no inner detail.

use thiserror::Error;

use crate::state::SubmissionState;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("illegal state transition {from} -> {to}")]
    InvalidTransition {
        from: SubmissionState,
        to: SubmissionState,
    },

    #[error("unknown state `{state}`")]
    UnknownState { state: String },

    #[error("invariant violation: {invariant}")]
    InvariantViolation { invariant: String },
}
