//! FormBridge Port Traits
//!
//! This crate defines the interfaces adapters must implement:
//! - `Storage`: submissions + events façade with token and
//!   idempotency-key indices
//! - `ObjectStore`: two-phase upload negotiation
//! - `DeliveryTransport` / `SubmissionCallback`: outbound delivery
//! - `ReviewerNotifier`: optional reviewer notifications
//! - `Clock`: deterministic time for tests
//!
//! Traits are object-safe (`async_trait`) so backends can be selected at
//! runtime behind `Arc<dyn …>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fb_domain::{
    Destination, Event, EventFilter, EventLogStats, FieldMap, Submission, SubmissionId, UploadId,
};

// ============================================================================
// Storage
// ============================================================================

/// Persistence façade over the submission store, the event store, and
/// their indices.
///
/// Implementations MUST guarantee that [`Storage::commit`] applies the
/// submission upsert and the event appends atomically: a failed append
/// leaves the prior state observable. A single-writer or transactional
/// backend is sufficient; callers already serialize writers per
/// submission.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StorageError>;

    /// Lookup by the *current* resume token. Rotated-out tokens do not
    /// resolve.
    async fn get_by_resume_token(&self, token: &str) -> Result<Option<Submission>, StorageError>;

    async fn get_by_idempotency_key(&self, key: &str)
        -> Result<Option<Submission>, StorageError>;

    /// Upsert; atomically refreshes the token and idempotency indices.
    async fn save_submission(&self, submission: &Submission) -> Result<(), StorageError>;

    /// Append one event, assigning the next per-submission version.
    /// Duplicate event ids fail with [`StorageError::DuplicateEvent`] —
    /// the idempotency signal for event writers.
    async fn append_event(&self, event: Event) -> Result<Event, StorageError>;

    /// Atomically persist a submission and append events. Returns the
    /// events with their assigned versions.
    async fn commit(
        &self,
        submission: &Submission,
        events: Vec<Event>,
    ) -> Result<Vec<Event>, StorageError>;

    /// Events for one submission, filtered, ordered by version ascending.
    async fn list_events(
        &self,
        submission_id: &SubmissionId,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StorageError>;

    async fn event_stats(&self) -> Result<EventLogStats, StorageError>;

    /// Non-terminal submissions whose `expires_at` has passed.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<SubmissionId>, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("duplicate event id `{event_id}`")]
    DuplicateEvent { event_id: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

// ============================================================================
// Object store
// ============================================================================

/// Pluggable object-storage backend for file uploads. Negotiation is
/// two-phase: issue a signed URL the client writes to, then verify what
/// actually landed.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn issue_upload_url(
        &self,
        key: &ObjectKey,
        constraints: &UploadConstraints,
    ) -> Result<UploadTicket, ObjectStoreError>;

    async fn verify_upload(&self, key: &ObjectKey) -> Result<UploadCheck, ObjectStoreError>;
}

/// Where an upload lives inside the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub intake_id: String,
    pub submission_id: SubmissionId,
    pub field_path: String,
    pub upload_id: UploadId,
}

impl ObjectKey {
    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.intake_id, self.submission_id, self.field_path, self.upload_id
        )
    }
}

/// Declared upload characteristics plus the intake's constraints, passed
/// to the backend so it can enforce them server-side where supported.
#[derive(Debug, Clone)]
pub struct UploadConstraints {
    pub accept: Vec<String>,
    pub max_bytes: u64,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// A negotiated upload slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub method: UploadMethod,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    pub expires_in_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMethod {
    Put,
    Post,
}

/// What the backend reports for a negotiated upload.
#[derive(Debug, Clone)]
pub enum UploadCheck {
    /// Nothing has landed yet.
    Pending,
    Completed {
        size_bytes: u64,
        storage_key: String,
    },
    Failed {
        reason: String,
    },
    /// The signed URL lapsed before bytes arrived.
    Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("storage error: {message}")]
    Backend { message: String },
}

// ============================================================================
// Delivery
// ============================================================================

/// Payload forwarded to an intake's destination. Carries the submission
/// identifier so destinations can deduplicate; delivery is
/// at-least-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    pub submission_id: SubmissionId,
    pub intake_id: String,
    pub fields: FieldMap,
    pub submitted_at: DateTime<Utc>,
    pub attempt: u32,
}

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &DeliveryPayload,
    ) -> Result<(), DeliveryError>;
}

/// In-process handler for `callback` destinations.
#[async_trait]
pub trait SubmissionCallback: Send + Sync {
    async fn handle(&self, payload: &DeliveryPayload) -> Result<(), DeliveryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("destination rejected the delivery: {message}")]
    Rejected { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("no transport registered for destination kind `{kind}`")]
    Unsupported { kind: String },
}

// ============================================================================
// Reviewer notification
// ============================================================================

/// Out-of-band reviewer notification. Optional: a missing notifier must
/// never break the triggering operation.
#[async_trait]
pub trait ReviewerNotifier: Send + Sync {
    async fn notify(&self, notice: &ReviewNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewNotice {
    pub submission_id: SubmissionId,
    pub intake_id: String,
    pub intake_name: String,
    pub gates: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification failed: {message}")]
    Failed { message: String },
}

// ============================================================================
// Clock
// ============================================================================

/// Clock port for deterministic time handling.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
