//! The submission aggregate

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::fields::FieldMap;
use crate::ids::{SubmissionId, UploadId};
use crate::state::SubmissionState;
use crate::token::ResumeToken;

/// The root aggregate: one in-flight or completed instance of an intake.
///
/// A submission is owned by whichever actor holds its current
/// `resume_token`; ownership is capability-based, not identity-based.
/// Terminal states stop all mutations but the record persists for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub intake_id: String,
    pub state: SubmissionState,
    pub resume_token: ResumeToken,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: FieldMap,
    /// Actor that most recently wrote each field path. Last writer wins;
    /// the event log is the full history.
    #[serde(default)]
    pub field_attribution: BTreeMap<String, Actor>,
    #[serde(default)]
    pub uploads: BTreeMap<UploadId, UploadRecord>,
    pub created_by: Actor,
    pub updated_by: Actor,
    /// Every idempotency key this submission has honored, with enough of
    /// the original reply to replay it verbatim.
    #[serde(default)]
    pub idempotency_keys: BTreeMap<String, IdempotencyRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub review_decisions: Vec<ReviewDecision>,
    /// Set when delivery exhausted its retry budget. The record stays in
    /// `submitted` and reads surface a `delivery_failed` error so
    /// operators can act.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

impl Submission {
    pub fn pending_uploads(&self) -> impl Iterator<Item = &UploadRecord> {
        self.uploads
            .values()
            .filter(|u| u.status == UploadStatus::Pending)
    }

    pub fn has_pending_uploads(&self) -> bool {
        self.pending_uploads().next().is_some()
    }

    /// Field paths backed by a completed upload.
    pub fn completed_upload_paths(&self) -> BTreeSet<String> {
        self.uploads
            .values()
            .filter(|u| u.status == UploadStatus::Completed)
            .map(|u| u.field_path.clone())
            .collect()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline < now)
    }

    /// Mint a fresh capability, invalidating the previous one.
    pub fn rotate_token(&mut self) -> &ResumeToken {
        self.resume_token = ResumeToken::generate();
        &self.resume_token
    }
}

/// One negotiated file upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub upload_id: UploadId,
    pub field_path: String,
    pub filename: String,
    pub mime_type: String,
    /// Size declared at negotiation, verified against what landed.
    pub size_bytes: u64,
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    /// When the signed upload URL stops working.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Completed,
    Failed,
}

/// A reviewer's verdict on a submission in `needs_review`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    pub action: ReviewAction,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_comments: Vec<FieldComment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    RequestChanges,
}

/// Reviewer feedback addressed to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldComment {
    pub field_path: String,
    pub comment: String,
}

/// Reply snapshot recorded against an honored idempotency key. Replays
/// return the same result without re-executing the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IdempotencyRecord {
    Create,
    Submit { outcome: RecordedSubmit },
}

/// The portion of a submit response that must replay verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecordedSubmit {
    #[serde(rename_all = "camelCase")]
    Accepted {
        state: SubmissionState,
        resume_token: String,
    },
    #[serde(rename_all = "camelCase")]
    NeedsApproval {
        gates: Vec<String>,
        resume_token: String,
    },
}
