//! Submission lifecycle states and the legal-transition table

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Submission lifecycle state.
///
/// The historical `created` name for the initial state deserializes to
/// `Draft` for event-log back-compat; only `draft` is ever emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    #[serde(alias = "created")]
    Draft,
    InProgress,
    AwaitingUpload,
    Submitted,
    NeedsReview,
    Approved,
    Rejected,
    Finalized,
    Cancelled,
    Expired,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Draft => "draft",
            SubmissionState::InProgress => "in_progress",
            SubmissionState::AwaitingUpload => "awaiting_upload",
            SubmissionState::Submitted => "submitted",
            SubmissionState::NeedsReview => "needs_review",
            SubmissionState::Approved => "approved",
            SubmissionState::Rejected => "rejected",
            SubmissionState::Finalized => "finalized",
            SubmissionState::Cancelled => "cancelled",
            SubmissionState::Expired => "expired",
        }
    }

    /// Terminal states stop all mutations; the record persists for audit.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Rejected
                | SubmissionState::Finalized
                | SubmissionState::Cancelled
                | SubmissionState::Expired
        )
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single source of truth for what a submission may become next.
pub struct SubmissionStateMachine;

impl SubmissionStateMachine {
    /// Outgoing edges for a state.
    pub fn allowed_next(from: SubmissionState) -> &'static [SubmissionState] {
        use SubmissionState::*;
        match from {
            Draft => &[InProgress, AwaitingUpload, Submitted, NeedsReview, Cancelled, Expired],
            InProgress => &[AwaitingUpload, Submitted, NeedsReview, Cancelled, Expired],
            AwaitingUpload => &[InProgress, Cancelled, Expired],
            Submitted => &[Finalized, Cancelled],
            NeedsReview => &[Approved, Rejected, Draft],
            Approved => &[Submitted, Finalized],
            Rejected | Finalized | Cancelled | Expired => &[],
        }
    }

    pub fn can_transition(from: SubmissionState, to: SubmissionState) -> bool {
        Self::allowed_next(from).contains(&to)
    }

    /// Checked before every state write. A violation is a programmer
    /// error: it panics in debug builds and is refused in release builds
    /// so callers can log it. Never silently coerced.
    pub fn assert_valid_transition(
        from: SubmissionState,
        to: SubmissionState,
    ) -> Result<(), DomainError> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            debug_assert!(false, "illegal state transition {from} -> {to}");
            Err(DomainError::InvalidTransition { from, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubmissionState::*;

    #[test]
    fn draft_edges() {
        for to in [InProgress, AwaitingUpload, Submitted, NeedsReview, Cancelled, Expired] {
            assert!(SubmissionStateMachine::can_transition(Draft, to));
        }
        assert!(!SubmissionStateMachine::can_transition(Draft, Finalized));
        assert!(!SubmissionStateMachine::can_transition(Draft, Approved));
        assert!(!SubmissionStateMachine::can_transition(Draft, Rejected));
    }

    #[test]
    fn upload_loop_returns_to_in_progress() {
        assert!(SubmissionStateMachine::can_transition(AwaitingUpload, InProgress));
        assert!(!SubmissionStateMachine::can_transition(AwaitingUpload, Submitted));
        assert!(!SubmissionStateMachine::can_transition(AwaitingUpload, NeedsReview));
    }

    #[test]
    fn review_loop_is_reentrant_through_draft() {
        assert!(SubmissionStateMachine::can_transition(NeedsReview, Draft));
        assert!(SubmissionStateMachine::can_transition(NeedsReview, Approved));
        assert!(SubmissionStateMachine::can_transition(NeedsReview, Rejected));
        assert!(!SubmissionStateMachine::can_transition(NeedsReview, Cancelled));
        assert!(SubmissionStateMachine::can_transition(Approved, Submitted));
        assert!(SubmissionStateMachine::can_transition(Approved, Finalized));
    }

    #[test]
    fn terminal_states_have_no_edges() {
        for terminal in [Rejected, Finalized, Cancelled, Expired] {
            assert!(terminal.is_terminal());
            assert!(SubmissionStateMachine::allowed_next(terminal).is_empty());
        }
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic)]
    fn illegal_transition_is_fatal_in_debug() {
        let _ = SubmissionStateMachine::assert_valid_transition(Finalized, Draft);
    }

    #[test]
    fn states_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&AwaitingUpload).unwrap(),
            "\"awaiting_upload\""
        );
        assert_eq!(serde_json::to_string(&NeedsReview).unwrap(), "\"needs_review\"");
    }

    #[test]
    fn legacy_created_state_aliases_to_draft() {
        let state: SubmissionState = serde_json::from_str("\"created\"").unwrap();
        assert_eq!(state, Draft);
        // Only the canonical name is emitted.
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"draft\"");
    }

    #[test]
    fn unknown_state_is_rejected() {
        assert!(serde_json::from_str::<SubmissionState>("\"archived\"").is_err());
    }
}
