//! Commands accepted by the submission manager
//!
//! Transports build these from their envelopes; the manager consumes
//! them. Path-style identifiers (submission id, upload id) ride along so
//! one struct describes one operation completely.

use crate::actor::Actor;
use crate::fields::FieldMap;
use crate::ids::{SubmissionId, UploadId};
use crate::submission::FieldComment;

#[derive(Debug, Clone)]
pub struct CreateSubmission {
    pub intake_id: String,
    pub actor: Actor,
    pub idempotency_key: Option<String>,
    pub initial_fields: FieldMap,
    pub ttl_ms: Option<u64>,
}

impl CreateSubmission {
    pub fn new(intake_id: impl Into<String>, actor: Actor) -> Self {
        Self {
            intake_id: intake_id.into(),
            actor,
            idempotency_key: None,
            initial_fields: FieldMap::new(),
            ttl_ms: None,
        }
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn initial_fields(mut self, fields: FieldMap) -> Self {
        self.initial_fields = fields;
        self
    }

    pub fn ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SetFields {
    pub submission_id: SubmissionId,
    pub resume_token: String,
    pub actor: Actor,
    pub fields: FieldMap,
}

#[derive(Debug, Clone)]
pub struct RequestUpload {
    pub submission_id: SubmissionId,
    pub resume_token: String,
    pub actor: Actor,
    pub field_path: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ConfirmUpload {
    pub submission_id: SubmissionId,
    pub resume_token: String,
    pub upload_id: UploadId,
    pub actor: Actor,
}

#[derive(Debug, Clone)]
pub struct SubmitSubmission {
    pub submission_id: SubmissionId,
    pub resume_token: String,
    pub idempotency_key: String,
    pub actor: Actor,
}

#[derive(Debug, Clone)]
pub struct CancelSubmission {
    pub submission_id: SubmissionId,
    pub actor: Actor,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApproveSubmission {
    pub submission_id: SubmissionId,
    pub resume_token: String,
    pub actor: Actor,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RejectSubmission {
    pub submission_id: SubmissionId,
    pub resume_token: String,
    pub actor: Actor,
    pub reason: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RequestChanges {
    pub submission_id: SubmissionId,
    pub resume_token: String,
    pub actor: Actor,
    pub field_comments: Vec<FieldComment>,
    pub comment: Option<String>,
}
