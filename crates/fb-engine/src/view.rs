//! Read-side submission view
//!
//! What callers see on reads. The resume token is deliberately absent:
//! it is a capability, returned only by the operations that rotate it
//! (and known to the caller on token-addressed reads).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use fb_domain::{
    Actor, ErrorBody, ErrorType, Event, FieldMap, NextAction, ReviewDecision, Submission,
    SubmissionId, SubmissionState, UploadRecord,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub submission_id: SubmissionId,
    pub intake_id: String,
    pub state: SubmissionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub fields: FieldMap,
    pub field_attribution: BTreeMap<String, Actor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uploads: Vec<UploadRecord>,
    pub created_by: Actor,
    pub updated_by: Actor,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub review_decisions: Vec<ReviewDecision>,
    /// Inline view of the submission's event stream; the authoritative
    /// copy lives in the event log.
    pub events: Vec<Event>,
    /// Present when delivery exhausted its retry budget; the submission
    /// stays in `submitted` until an operator acts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl SubmissionView {
    pub fn of(submission: &Submission) -> Self {
        Self {
            submission_id: submission.id.clone(),
            intake_id: submission.intake_id.clone(),
            state: submission.state,
            created_at: submission.created_at,
            updated_at: submission.updated_at,
            expires_at: submission.expires_at,
            fields: submission.fields.clone(),
            field_attribution: submission.field_attribution.clone(),
            uploads: submission.uploads.values().cloned().collect(),
            created_by: submission.created_by.clone(),
            updated_by: submission.updated_by.clone(),
            review_decisions: submission.review_decisions.clone(),
            events: Vec::new(),
            error: submission.delivery_error.as_ref().map(|message| ErrorBody {
                error_type: ErrorType::DeliveryFailed,
                message: message.clone(),
                fields: Vec::new(),
                next_actions: vec![NextAction::RetryDelivery],
                retryable: false,
                retry_after_ms: None,
            }),
        }
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }
}
