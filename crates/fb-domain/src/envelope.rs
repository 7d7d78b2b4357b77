//! Structured error envelopes and operation outcomes
//!
//! Protocol refusals are data, not exceptions: they travel back to the
//! caller with field diagnostics and next-action hints so agents can
//! self-correct. Thrown [`crate::errors::DomainError`]s and adapter
//! failures are a separate channel and never reach callers with inner
//! detail.

use serde::{Deserialize, Serialize};

use crate::ids::SubmissionId;
use crate::state::SubmissionState;
use crate::validator::{FieldError, NextAction};

/// Closed error taxonomy shared by every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Missing,
    Invalid,
    Conflict,
    NeedsApproval,
    UploadPending,
    DeliveryFailed,
    Expired,
    Cancelled,
    NotFound,
    InvalidResumeToken,
    InvalidRequest,
    ValidationError,
    InternalError,
}

/// The `error` object of a refusal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<NextAction>,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// A complete structured refusal, with the submission context a caller
/// needs to keep working (most importantly the current resume token on
/// expected refusals like `needs_approval`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<SubmissionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SubmissionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            submission_id: None,
            state: None,
            resume_token: None,
            error: ErrorBody {
                error_type,
                message: message.into(),
                fields: Vec::new(),
                next_actions: Vec::new(),
                retryable: false,
                retry_after_ms: None,
            },
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorType::NotFound, what)
    }

    pub fn invalid_resume_token() -> Self {
        Self::new(ErrorType::InvalidResumeToken, "resume token does not match")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Conflict, message)
    }

    pub fn expired() -> Self {
        Self::new(ErrorType::Expired, "submission has expired")
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorType::Cancelled, "submission has been cancelled")
    }

    pub fn validation(fields: Vec<FieldError>, next_actions: Vec<NextAction>) -> Self {
        let mut envelope = Self::new(ErrorType::ValidationError, "one or more fields are invalid");
        envelope.error.fields = fields;
        envelope.error.next_actions = next_actions;
        envelope
    }

    pub fn needs_approval(gates: &[String]) -> Self {
        let mut envelope = Self::new(
            ErrorType::NeedsApproval,
            format!("submission requires review ({})", gates.join(", ")),
        );
        envelope.error.next_actions = vec![NextAction::WaitForReview];
        envelope
    }

    pub fn upload_pending(field_path: &str) -> Self {
        let mut envelope = Self::new(
            ErrorType::UploadPending,
            format!("upload for `{field_path}` has not arrived yet"),
        );
        envelope.error.retryable = true;
        envelope
    }

    pub fn with_submission(mut self, id: &SubmissionId, state: SubmissionState) -> Self {
        self.submission_id = Some(id.clone());
        self.state = Some(state);
        self
    }

    pub fn with_resume_token(mut self, token: impl Into<String>) -> Self {
        self.resume_token = Some(token.into());
        self
    }

    pub fn retryable(mut self, retry_after_ms: Option<u64>) -> Self {
        self.error.retryable = true;
        self.error.retry_after_ms = retry_after_ms;
        self
    }
}

/// Protocol outcome of an operation: accepted with a reply, or refused
/// with a structured envelope. Thrown errors travel in the surrounding
/// `Result`.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Accepted(T),
    Refused(ErrorEnvelope),
}

impl<T> Outcome<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }

    pub fn accepted(self) -> Option<T> {
        match self {
            Outcome::Accepted(value) => Some(value),
            Outcome::Refused(_) => None,
        }
    }

    pub fn refused(self) -> Option<ErrorEnvelope> {
        match self {
            Outcome::Accepted(_) => None,
            Outcome::Refused(envelope) => Some(envelope),
        }
    }

    /// Panics on refusal. Test convenience.
    pub fn unwrap_accepted(self) -> T {
        match self {
            Outcome::Accepted(value) => value,
            Outcome::Refused(envelope) => {
                panic!("expected acceptance, got refusal: {envelope:?}")
            }
        }
    }

    /// Panics on acceptance. Test convenience.
    pub fn unwrap_refused(self) -> ErrorEnvelope {
        match self {
            Outcome::Refused(envelope) => envelope,
            Outcome::Accepted(_) => panic!("expected refusal, got acceptance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_to_the_wire_shape() {
        let envelope = ErrorEnvelope::needs_approval(&["legal".to_string()])
            .with_submission(&SubmissionId::from("sub_01TEST"), SubmissionState::NeedsReview)
            .with_resume_token("tok");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["submissionId"], "sub_01TEST");
        assert_eq!(json["state"], "needs_review");
        assert_eq!(json["resumeToken"], "tok");
        assert_eq!(json["error"]["type"], "needs_approval");
        assert_eq!(json["error"]["retryable"], false);
        assert_eq!(json["error"]["nextActions"][0]["action"], "wait_for_review");
    }

    #[test]
    fn retryable_refusals_carry_retry_after() {
        let envelope = ErrorEnvelope::new(ErrorType::DeliveryFailed, "boom").retryable(Some(2000));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["retryable"], true);
        assert_eq!(json["error"]["retryAfterMs"], 2000);
    }

    #[test]
    fn error_types_use_snake_case_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorType::InvalidResumeToken).unwrap(),
            "\"invalid_resume_token\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorType::NeedsApproval).unwrap(),
            "\"needs_approval\""
        );
    }
}
