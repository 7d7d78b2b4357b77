//! Submission manager
//!
//! The protocol engine. Coordinates create / set-fields / request-upload
//! / confirm-upload / submit / cancel / expire plus handoff, enforcing:
//! token rotation on every state-mutating success (with the one
//! exception of a failed upload confirmation), per-submission write
//! locks, field attribution, idempotent create/submit replay, and the
//! legal-transition table.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use fb_domain::{
    reserved_paths, validate_full, validate_partial, Actor, CancelSubmission, ConfirmUpload,
    CreateSubmission, ErrorEnvelope, ErrorType, Event, EventFilter, EventType, FieldError,
    IdempotencyRecord, NextAction, Outcome, RecordedSubmit, RequestUpload, ResumeToken, SetFields,
    Submission, SubmissionId, SubmissionState, SubmissionStateMachine, SubmitSubmission, UploadId,
    UploadRecord, UploadStatus,
};
use fb_ports::{
    Clock, ObjectKey, ObjectStore, ReviewNotice, ReviewerNotifier, Storage, UploadCheck,
    UploadConstraints, UploadMethod,
};

use crate::delivery::DeliveryEngine;
use crate::error::{accept, EngineError, OpResult};
use crate::locks::SubmissionLocks;
use crate::registry::IntakeRegistry;
use crate::view::SubmissionView;

/// States a caller may still write fields or uploads into.
const WRITABLE: &[SubmissionState] = &[
    SubmissionState::Draft,
    SubmissionState::InProgress,
    SubmissionState::AwaitingUpload,
];

pub struct SubmissionManager {
    storage: Arc<dyn Storage>,
    registry: Arc<IntakeRegistry>,
    objects: Option<Arc<dyn ObjectStore>>,
    delivery: Arc<DeliveryEngine>,
    locks: Arc<SubmissionLocks>,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn ReviewerNotifier>>,
    base_url: String,
}

// ============================================================================
// Replies
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReply {
    pub submission_id: SubmissionId,
    pub state: SubmissionState,
    pub resume_token: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<NextAction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFieldsReply {
    pub submission_id: SubmissionId,
    pub state: SubmissionState,
    pub resume_token: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<NextAction>,
}

/// The negotiated upload slot handed back to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadNegotiation {
    pub submission_id: SubmissionId,
    pub upload_id: UploadId,
    pub method: UploadMethod,
    pub url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    pub expires_in_ms: u64,
    pub constraints: UploadLimits,
    pub state: SubmissionState,
    pub resume_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLimits {
    pub accept: Vec<String>,
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadReply {
    pub submission_id: SubmissionId,
    pub state: SubmissionState,
    pub resume_token: String,
    pub field_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReply {
    pub submission_id: SubmissionId,
    pub state: SubmissionState,
    pub resume_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReply {
    pub submission_id: SubmissionId,
    pub state: SubmissionState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffReply {
    pub submission_id: SubmissionId,
    pub url: String,
    pub resume_token: String,
}

// ============================================================================
// Operations
// ============================================================================

impl SubmissionManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<IntakeRegistry>,
        objects: Option<Arc<dyn ObjectStore>>,
        delivery: Arc<DeliveryEngine>,
        locks: Arc<SubmissionLocks>,
        clock: Arc<dyn Clock>,
        notifier: Option<Arc<dyn ReviewerNotifier>>,
        base_url: String,
    ) -> Self {
        Self {
            storage,
            registry,
            objects,
            delivery,
            locks,
            clock,
            notifier,
            base_url,
        }
    }

    #[instrument(skip(self, cmd), fields(intake_id = %cmd.intake_id, actor = %cmd.actor.id))]
    pub async fn create(&self, cmd: CreateSubmission) -> OpResult<CreateReply> {
        let Some(intake) = self.registry.get(&cmd.intake_id) else {
            return Ok(Outcome::Refused(ErrorEnvelope::not_found(format!(
                "intake `{}` is not registered",
                cmd.intake_id
            ))));
        };

        // A replayed create returns the bound submission's identifiers
        // with its *current* resume token.
        if let Some(key) = &cmd.idempotency_key {
            if let Some(existing) = self.storage.get_by_idempotency_key(key).await? {
                let report = validate_partial(&intake.schema, &existing.fields);
                return Ok(Outcome::Accepted(CreateReply {
                    submission_id: existing.id.clone(),
                    state: existing.state,
                    resume_token: existing.resume_token.as_str().to_string(),
                    missing_fields: report.missing,
                    next_actions: report.next_actions,
                }));
            }
        }

        if let Some(envelope) = reserved_path_refusal(&cmd.initial_fields) {
            return Ok(Outcome::Refused(envelope));
        }

        let report = validate_partial(&intake.schema, &cmd.initial_fields);
        if !report.ok {
            let actions = collect_actions(&report.errors);
            return Ok(Outcome::Refused(ErrorEnvelope::validation(report.errors, actions)));
        }

        let now = self.clock.now();
        let id = SubmissionId::new();
        let state = if report.normalized.is_empty() {
            SubmissionState::Draft
        } else {
            SubmissionState::InProgress
        };

        let mut submission = Submission {
            id: id.clone(),
            intake_id: intake.id.clone(),
            state,
            resume_token: ResumeToken::generate(),
            created_at: now,
            updated_at: now,
            expires_at: cmd
                .ttl_ms
                .or(intake.ttl_ms)
                .map(|ttl| now + Duration::milliseconds(ttl as i64)),
            fields: report.normalized.clone(),
            field_attribution: report
                .normalized
                .keys()
                .map(|path| (path.clone(), cmd.actor.clone()))
                .collect(),
            uploads: BTreeMap::new(),
            created_by: cmd.actor.clone(),
            updated_by: cmd.actor.clone(),
            idempotency_keys: BTreeMap::new(),
            review_decisions: Vec::new(),
            delivery_error: None,
        };
        if let Some(key) = &cmd.idempotency_key {
            submission
                .idempotency_keys
                .insert(key.clone(), IdempotencyRecord::Create);
        }

        let created = Event::record(
            &id,
            &cmd.actor,
            state,
            EventType::SubmissionCreated,
            Some(json!({
                "intakeId": &intake.id,
                "initialFields": report.normalized.keys().collect::<Vec<_>>(),
            })),
            now,
        );
        self.storage.commit(&submission, vec![created]).await?;

        info!(submission_id = %id, state = %state, "submission created");

        Ok(Outcome::Accepted(CreateReply {
            submission_id: id,
            state,
            resume_token: submission.resume_token.as_str().to_string(),
            missing_fields: report.missing,
            next_actions: report.next_actions,
        }))
    }

    #[instrument(skip(self, cmd), fields(submission_id = %cmd.submission_id, actor = %cmd.actor.id))]
    pub async fn set_fields(&self, cmd: SetFields) -> OpResult<SetFieldsReply> {
        let _guard = self.locks.acquire(&cmd.submission_id).await;
        let mut submission = accept!(
            self.load_writable(&cmd.submission_id, &cmd.resume_token, WRITABLE)
                .await?
        );
        let intake = self.intake_for(&submission)?;

        if cmd.fields.is_empty() {
            return Ok(Outcome::Refused(
                ErrorEnvelope::new(ErrorType::InvalidRequest, "no fields provided")
                    .with_submission(&submission.id, submission.state),
            ));
        }

        if let Some(envelope) = reserved_path_refusal(&cmd.fields) {
            return Ok(Outcome::Refused(
                envelope.with_submission(&submission.id, submission.state),
            ));
        }

        let report = validate_partial(&intake.schema, &cmd.fields);
        if !report.ok {
            let actions = collect_actions(&report.errors);
            return Ok(Outcome::Refused(
                ErrorEnvelope::validation(report.errors, actions)
                    .with_submission(&submission.id, submission.state),
            ));
        }

        let now = self.clock.now();
        if submission.state == SubmissionState::Draft {
            SubmissionStateMachine::assert_valid_transition(
                submission.state,
                SubmissionState::InProgress,
            )?;
            submission.state = SubmissionState::InProgress;
        }

        let mut events = Vec::with_capacity(report.normalized.len());
        for (path, value) in &report.normalized {
            let old = submission.fields.get(path).cloned();
            events.push(Event::record(
                &submission.id,
                &cmd.actor,
                submission.state,
                EventType::FieldUpdated,
                Some(json!({
                    "fieldPath": path,
                    "oldValue": old,
                    "newValue": value,
                })),
                now,
            ));
            submission.fields.insert(path.clone(), value.clone());
            submission
                .field_attribution
                .insert(path.clone(), cmd.actor.clone());
        }

        submission.rotate_token();
        submission.updated_at = now;
        submission.updated_by = cmd.actor.clone();
        self.storage.commit(&submission, events).await?;

        let remaining = validate_partial(&intake.schema, &submission.fields);

        Ok(Outcome::Accepted(SetFieldsReply {
            submission_id: submission.id.clone(),
            state: submission.state,
            resume_token: submission.resume_token.as_str().to_string(),
            missing_fields: remaining.missing,
            next_actions: remaining.next_actions,
        }))
    }

    #[instrument(skip(self, cmd), fields(submission_id = %cmd.submission_id, field_path = %cmd.field_path))]
    pub async fn request_upload(&self, cmd: RequestUpload) -> OpResult<UploadNegotiation> {
        let _guard = self.locks.acquire(&cmd.submission_id).await;
        let mut submission = accept!(
            self.load_writable(&cmd.submission_id, &cmd.resume_token, WRITABLE)
                .await?
        );
        let intake = self.intake_for(&submission)?;

        let Some((accept_types, max_bytes)) = intake.schema.field(&cmd.field_path).and_then(|spec| {
            match &spec.kind {
                fb_domain::FieldKind::File { accept, max_bytes } => {
                    Some((accept.clone(), *max_bytes))
                }
                _ => None,
            }
        }) else {
            return Ok(Outcome::Refused(
                ErrorEnvelope::validation(
                    vec![FieldError::new(
                        &cmd.field_path,
                        fb_domain::FieldErrorCode::InvalidValue,
                        "field is not declared as a file field",
                    )],
                    Vec::new(),
                )
                .with_submission(&submission.id, submission.state),
            ));
        };

        if cmd.size_bytes > max_bytes {
            return Ok(Outcome::Refused(
                ErrorEnvelope::validation(
                    vec![FieldError::new(
                        &cmd.field_path,
                        fb_domain::FieldErrorCode::FileTooLarge,
                        format!("declared size exceeds {max_bytes} bytes"),
                    )
                    .expected(format!("<= {max_bytes} bytes"))
                    .received(cmd.size_bytes.to_string())],
                    Vec::new(),
                )
                .with_submission(&submission.id, submission.state),
            ));
        }
        if !accept_types.is_empty() && !accept_types.contains(&cmd.mime_type) {
            return Ok(Outcome::Refused(
                ErrorEnvelope::validation(
                    vec![FieldError::new(
                        &cmd.field_path,
                        fb_domain::FieldErrorCode::FileWrongType,
                        "mime type is not accepted for this field",
                    )
                    .expected(accept_types.join(" | "))
                    .received(cmd.mime_type.clone())],
                    Vec::new(),
                )
                .with_submission(&submission.id, submission.state),
            ));
        }

        let objects = self.objects.as_ref().ok_or(EngineError::ObjectStoreMissing)?;

        let upload_id = UploadId::new();
        let key = ObjectKey {
            intake_id: submission.intake_id.clone(),
            submission_id: submission.id.clone(),
            field_path: cmd.field_path.clone(),
            upload_id: upload_id.clone(),
        };
        let constraints = UploadConstraints {
            accept: accept_types.clone(),
            max_bytes,
            mime_type: cmd.mime_type.clone(),
            size_bytes: cmd.size_bytes,
        };
        let ticket = objects.issue_upload_url(&key, &constraints).await?;

        let now = self.clock.now();
        submission.uploads.insert(
            upload_id.clone(),
            UploadRecord {
                upload_id: upload_id.clone(),
                field_path: cmd.field_path.clone(),
                filename: cmd.filename.clone(),
                mime_type: cmd.mime_type.clone(),
                size_bytes: cmd.size_bytes,
                status: UploadStatus::Pending,
                storage_key: None,
                uploaded_at: None,
                expires_at: now + Duration::milliseconds(ticket.expires_in_ms as i64),
            },
        );

        if matches!(
            submission.state,
            SubmissionState::Draft | SubmissionState::InProgress
        ) {
            SubmissionStateMachine::assert_valid_transition(
                submission.state,
                SubmissionState::AwaitingUpload,
            )?;
            submission.state = SubmissionState::AwaitingUpload;
        }

        submission.rotate_token();
        submission.updated_at = now;
        submission.updated_by = cmd.actor.clone();

        let requested = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::UploadRequested,
            Some(json!({
                "uploadId": &upload_id,
                "fieldPath": &cmd.field_path,
                "filename": &cmd.filename,
                "mimeType": &cmd.mime_type,
                "sizeBytes": cmd.size_bytes,
            })),
            now,
        );
        self.storage.commit(&submission, vec![requested]).await?;

        Ok(Outcome::Accepted(UploadNegotiation {
            submission_id: submission.id.clone(),
            upload_id,
            method: ticket.method,
            url: ticket.url,
            headers: ticket.headers,
            expires_in_ms: ticket.expires_in_ms,
            constraints: UploadLimits {
                accept: accept_types,
                max_bytes,
            },
            state: submission.state,
            resume_token: submission.resume_token.as_str().to_string(),
        }))
    }

    #[instrument(skip(self, cmd), fields(submission_id = %cmd.submission_id, upload_id = %cmd.upload_id))]
    pub async fn confirm_upload(&self, cmd: ConfirmUpload) -> OpResult<ConfirmUploadReply> {
        let _guard = self.locks.acquire(&cmd.submission_id).await;
        let mut submission = accept!(
            self.load_writable(&cmd.submission_id, &cmd.resume_token, WRITABLE)
                .await?
        );

        let Some(mut record) = submission.uploads.get(&cmd.upload_id).cloned() else {
            return Ok(Outcome::Refused(
                ErrorEnvelope::not_found(format!("upload `{}` not found", cmd.upload_id))
                    .with_submission(&submission.id, submission.state),
            ));
        };

        // Re-confirming an already completed upload is a no-op.
        if record.status == UploadStatus::Completed {
            return Ok(Outcome::Accepted(ConfirmUploadReply {
                submission_id: submission.id.clone(),
                state: submission.state,
                resume_token: submission.resume_token.as_str().to_string(),
                field_path: record.field_path,
            }));
        }

        let objects = self.objects.as_ref().ok_or(EngineError::ObjectStoreMissing)?;
        let key = ObjectKey {
            intake_id: submission.intake_id.clone(),
            submission_id: submission.id.clone(),
            field_path: record.field_path.clone(),
            upload_id: cmd.upload_id.clone(),
        };

        let now = self.clock.now();
        let check = match objects.verify_upload(&key).await? {
            // The backend cannot see the negotiation window; a pending
            // upload past its window is an expired one.
            UploadCheck::Pending if record.expires_at < now => UploadCheck::Expired,
            other => other,
        };

        match check {
            UploadCheck::Pending => Ok(Outcome::Refused(
                ErrorEnvelope::upload_pending(&record.field_path)
                    .with_submission(&submission.id, submission.state)
                    .with_resume_token(submission.resume_token.as_str()),
            )),
            UploadCheck::Completed {
                size_bytes,
                storage_key,
            } => {
                record.status = UploadStatus::Completed;
                record.uploaded_at = Some(now);
                record.storage_key = Some(storage_key.clone());
                record.size_bytes = size_bytes;
                let field_path = record.field_path.clone();
                submission.uploads.insert(cmd.upload_id.clone(), record);

                if submission.state == SubmissionState::AwaitingUpload
                    && !submission.has_pending_uploads()
                {
                    SubmissionStateMachine::assert_valid_transition(
                        submission.state,
                        SubmissionState::InProgress,
                    )?;
                    submission.state = SubmissionState::InProgress;
                }

                submission.rotate_token();
                submission.updated_at = now;
                submission.updated_by = cmd.actor.clone();

                let completed = Event::record(
                    &submission.id,
                    &cmd.actor,
                    submission.state,
                    EventType::UploadCompleted,
                    Some(json!({
                        "uploadId": &cmd.upload_id,
                        "fieldPath": &field_path,
                        "storageKey": &storage_key,
                        "sizeBytes": size_bytes,
                    })),
                    now,
                );
                self.storage.commit(&submission, vec![completed]).await?;

                Ok(Outcome::Accepted(ConfirmUploadReply {
                    submission_id: submission.id.clone(),
                    state: submission.state,
                    resume_token: submission.resume_token.as_str().to_string(),
                    field_path,
                }))
            }
            UploadCheck::Failed { reason } => {
                self.fail_upload(&mut submission, record, &cmd, reason).await
            }
            UploadCheck::Expired => {
                self.fail_upload(
                    &mut submission,
                    record,
                    &cmd,
                    "upload window expired before any bytes arrived".to_string(),
                )
                .await
            }
        }
    }

    /// Mark an upload failed and refuse with the backend's reason. The
    /// token is deliberately NOT rotated so the client can retry the
    /// same handshake.
    async fn fail_upload(
        &self,
        submission: &mut Submission,
        mut record: UploadRecord,
        cmd: &ConfirmUpload,
        reason: String,
    ) -> OpResult<ConfirmUploadReply> {
        record.status = UploadStatus::Failed;
        let field_path = record.field_path.clone();
        submission.uploads.insert(cmd.upload_id.clone(), record);

        let now = self.clock.now();
        submission.updated_at = now;
        submission.updated_by = cmd.actor.clone();

        let failed = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::UploadFailed,
            Some(json!({
                "uploadId": &cmd.upload_id,
                "fieldPath": &field_path,
                "reason": &reason,
            })),
            now,
        );
        self.storage.commit(submission, vec![failed]).await?;

        warn!(submission_id = %submission.id, upload_id = %cmd.upload_id, reason = %reason, "upload failed");

        Ok(Outcome::Refused(
            ErrorEnvelope::new(ErrorType::Invalid, format!("upload failed: {reason}"))
                .retryable(None)
                .with_submission(&submission.id, submission.state)
                .with_resume_token(submission.resume_token.as_str()),
        ))
    }

    #[instrument(skip(self, cmd), fields(submission_id = %cmd.submission_id, actor = %cmd.actor.id))]
    pub async fn submit(&self, cmd: SubmitSubmission) -> OpResult<SubmitReply> {
        let _guard = self.locks.acquire(&cmd.submission_id).await;
        let Some(mut submission) = self.storage.get_submission(&cmd.submission_id).await? else {
            return Ok(Outcome::Refused(ErrorEnvelope::not_found(format!(
                "submission `{}` not found",
                cmd.submission_id
            ))));
        };

        // Replay before token verification: the original call rotated the
        // token, and a replayed request presents the pre-rotation one.
        if let Some(IdempotencyRecord::Submit { outcome }) =
            submission.idempotency_keys.get(&cmd.idempotency_key)
        {
            return Ok(replay_submit(&submission, outcome));
        }

        match submission.state {
            SubmissionState::Submitted | SubmissionState::Finalized => {
                return Ok(Outcome::Refused(
                    ErrorEnvelope::conflict("submission was already submitted")
                        .with_submission(&submission.id, submission.state),
                ));
            }
            SubmissionState::Cancelled => {
                return Ok(Outcome::Refused(
                    ErrorEnvelope::cancelled().with_submission(&submission.id, submission.state),
                ));
            }
            SubmissionState::Expired => {
                return Ok(Outcome::Refused(
                    ErrorEnvelope::expired().with_submission(&submission.id, submission.state),
                ));
            }
            SubmissionState::Rejected => {
                return Ok(Outcome::Refused(
                    ErrorEnvelope::conflict("submission was rejected")
                        .with_submission(&submission.id, submission.state),
                ));
            }
            SubmissionState::NeedsReview => {
                return Ok(Outcome::Refused(
                    ErrorEnvelope::conflict("submission is awaiting review")
                        .with_submission(&submission.id, submission.state),
                ));
            }
            SubmissionState::Approved => {
                return Ok(Outcome::Refused(
                    ErrorEnvelope::conflict("submission is already approved")
                        .with_submission(&submission.id, submission.state),
                ));
            }
            SubmissionState::AwaitingUpload => {
                return Ok(Outcome::Refused(
                    ErrorEnvelope::new(
                        ErrorType::UploadPending,
                        "uploads are still pending; confirm them before submitting",
                    )
                    .with_submission(&submission.id, submission.state),
                ));
            }
            SubmissionState::Draft | SubmissionState::InProgress => {}
        }

        if !submission.resume_token.matches(&cmd.resume_token) {
            return Ok(Outcome::Refused(
                ErrorEnvelope::invalid_resume_token()
                    .with_submission(&submission.id, submission.state),
            ));
        }

        let now = self.clock.now();
        if submission.is_expired(now) {
            self.force_expire(&mut submission).await?;
            return Ok(Outcome::Refused(
                ErrorEnvelope::expired().with_submission(&submission.id, submission.state),
            ));
        }

        let intake = self.intake_for(&submission)?;

        let report = validate_full(
            &intake.schema,
            &submission.fields,
            &submission.completed_upload_paths(),
        );
        if !report.ok {
            let failed = Event::record(
                &submission.id,
                &cmd.actor,
                submission.state,
                EventType::ValidationFailed,
                Some(json!({ "errors": &report.errors })),
                now,
            );
            self.storage.append_event(failed).await?;
            return Ok(Outcome::Refused(
                ErrorEnvelope::validation(report.errors, report.next_actions)
                    .with_submission(&submission.id, submission.state)
                    .with_resume_token(submission.resume_token.as_str()),
            ));
        }

        let passed = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::ValidationPassed,
            None,
            now,
        );

        let unsatisfied: Vec<String> = intake
            .approval_gates
            .iter()
            .filter(|gate| !gate.auto_approves(&submission.fields))
            .map(|gate| gate.name.clone())
            .collect();

        if !unsatisfied.is_empty() {
            SubmissionStateMachine::assert_valid_transition(
                submission.state,
                SubmissionState::NeedsReview,
            )?;
            submission.state = SubmissionState::NeedsReview;
            submission.rotate_token();
            submission.updated_at = now;
            submission.updated_by = cmd.actor.clone();

            let token = submission.resume_token.as_str().to_string();
            submission.idempotency_keys.insert(
                cmd.idempotency_key.clone(),
                IdempotencyRecord::Submit {
                    outcome: RecordedSubmit::NeedsApproval {
                        gates: unsatisfied.clone(),
                        resume_token: token.clone(),
                    },
                },
            );

            let requested = Event::record(
                &submission.id,
                &cmd.actor,
                submission.state,
                EventType::ReviewRequested,
                Some(json!({ "gates": &unsatisfied })),
                now,
            );
            self.storage
                .commit(&submission, vec![passed, requested])
                .await?;

            self.notify_reviewers(&intake.id, &intake.name, &submission, &unsatisfied)
                .await;

            info!(submission_id = %submission.id, gates = ?unsatisfied, "submission needs review");

            return Ok(Outcome::Refused(
                ErrorEnvelope::needs_approval(&unsatisfied)
                    .with_submission(&submission.id, submission.state)
                    .with_resume_token(token),
            ));
        }

        SubmissionStateMachine::assert_valid_transition(
            submission.state,
            SubmissionState::Submitted,
        )?;
        submission.state = SubmissionState::Submitted;
        submission.rotate_token();
        submission.updated_at = now;
        submission.updated_by = cmd.actor.clone();

        let token = submission.resume_token.as_str().to_string();
        submission.idempotency_keys.insert(
            cmd.idempotency_key.clone(),
            IdempotencyRecord::Submit {
                outcome: RecordedSubmit::Accepted {
                    state: SubmissionState::Submitted,
                    resume_token: token.clone(),
                },
            },
        );

        let submitted = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::SubmissionSubmitted,
            None,
            now,
        );
        self.storage
            .commit(&submission, vec![passed, submitted])
            .await?;

        self.delivery
            .enqueue(&submission.id, &submission.intake_id);

        info!(submission_id = %submission.id, "submission submitted");

        Ok(Outcome::Accepted(SubmitReply {
            submission_id: submission.id.clone(),
            state: submission.state,
            resume_token: token,
        }))
    }

    /// Terminal cancellation. Idempotent: cancelling a cancelled
    /// submission succeeds without another event.
    #[instrument(skip(self, cmd), fields(submission_id = %cmd.submission_id, actor = %cmd.actor.id))]
    pub async fn cancel(&self, cmd: CancelSubmission) -> OpResult<CancelReply> {
        let _guard = self.locks.acquire(&cmd.submission_id).await;
        let Some(mut submission) = self.storage.get_submission(&cmd.submission_id).await? else {
            return Ok(Outcome::Refused(ErrorEnvelope::not_found(format!(
                "submission `{}` not found",
                cmd.submission_id
            ))));
        };

        if submission.state == SubmissionState::Cancelled {
            return Ok(Outcome::Accepted(CancelReply {
                submission_id: submission.id.clone(),
                state: submission.state,
            }));
        }

        if !SubmissionStateMachine::can_transition(submission.state, SubmissionState::Cancelled) {
            return Ok(Outcome::Refused(
                ErrorEnvelope::conflict(format!(
                    "cannot cancel a submission in state `{}`",
                    submission.state
                ))
                .with_submission(&submission.id, submission.state),
            ));
        }

        let now = self.clock.now();
        SubmissionStateMachine::assert_valid_transition(
            submission.state,
            SubmissionState::Cancelled,
        )?;
        submission.state = SubmissionState::Cancelled;
        submission.rotate_token();
        submission.updated_at = now;
        submission.updated_by = cmd.actor.clone();

        let cancelled = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::SubmissionCancelled,
            cmd.reason.as_ref().map(|reason| json!({ "reason": reason })),
            now,
        );
        self.storage.commit(&submission, vec![cancelled]).await?;

        info!(submission_id = %submission.id, "submission cancelled");

        Ok(Outcome::Accepted(CancelReply {
            submission_id: submission.id.clone(),
            state: submission.state,
        }))
    }

    /// TTL expiry, driven by the sweeper. Returns whether a transition
    /// happened; terminal submissions are a no-op and emit nothing.
    pub async fn expire(&self, id: &SubmissionId) -> Result<bool, EngineError> {
        let _guard = self.locks.acquire(id).await;
        let Some(mut submission) = self.storage.get_submission(id).await? else {
            return Ok(false);
        };
        if submission.state.is_terminal()
            || !SubmissionStateMachine::can_transition(submission.state, SubmissionState::Expired)
        {
            return Ok(false);
        }
        self.force_expire(&mut submission).await?;
        Ok(true)
    }

    /// Issue a handoff link embedding the *current* resume token. Does
    /// not rotate: the link is the capability being shared.
    #[instrument(skip(self, actor), fields(submission_id = %id, actor = %actor.id))]
    pub async fn generate_handoff_url(
        &self,
        id: &SubmissionId,
        actor: &Actor,
    ) -> OpResult<HandoffReply> {
        let Some(submission) = self.storage.get_submission(id).await? else {
            return Ok(Outcome::Refused(ErrorEnvelope::not_found(format!(
                "submission `{id}` not found"
            ))));
        };

        let token = submission.resume_token.as_str().to_string();
        let url = format!(
            "{}/resume?token={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&token)
        );

        // The audit record must not leak the capability itself.
        let issued = Event::record(
            &submission.id,
            actor,
            submission.state,
            EventType::HandoffLinkIssued,
            None,
            self.clock.now(),
        );
        self.storage.append_event(issued).await?;

        Ok(Outcome::Accepted(HandoffReply {
            submission_id: submission.id,
            url,
            resume_token: token,
        }))
    }

    /// Record that a handoff link was opened. No state mutation, no
    /// rotation; the dual of [`SubmissionManager::generate_handoff_url`].
    pub async fn handoff_resumed(&self, token: &str, actor: &Actor) -> OpResult<SubmissionView> {
        let Some(submission) = self.storage.get_by_resume_token(token).await? else {
            return Ok(Outcome::Refused(ErrorEnvelope::invalid_resume_token()));
        };

        let resumed = Event::record(
            &submission.id,
            actor,
            submission.state,
            EventType::HandoffResumed,
            None,
            self.clock.now(),
        );
        self.storage.append_event(resumed).await?;

        let view = self.view_of(&submission).await?;
        Ok(Outcome::Accepted(view))
    }

    pub async fn get(&self, id: &SubmissionId) -> Result<Option<SubmissionView>, EngineError> {
        match self.storage.get_submission(id).await? {
            Some(submission) => Ok(Some(self.view_of(&submission).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_token(&self, token: &str) -> Result<Option<SubmissionView>, EngineError> {
        match self.storage.get_by_resume_token(token).await? {
            Some(submission) => Ok(Some(self.view_of(&submission).await?)),
            None => Ok(None),
        }
    }

    /// Read model: the record plus the inline view of its event stream.
    async fn view_of(&self, submission: &Submission) -> Result<SubmissionView, EngineError> {
        let events = self
            .storage
            .list_events(&submission.id, &EventFilter::default())
            .await?;
        Ok(SubmissionView::of(submission).with_events(events))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Shared preamble for write operations: load, refuse non-writable
    /// states, verify the token in constant time, enforce expiry.
    async fn load_writable(
        &self,
        id: &SubmissionId,
        token: &str,
        writable: &[SubmissionState],
    ) -> OpResult<Submission> {
        let Some(mut submission) = self.storage.get_submission(id).await? else {
            return Ok(Outcome::Refused(ErrorEnvelope::not_found(format!(
                "submission `{id}` not found"
            ))));
        };

        if !writable.contains(&submission.state) {
            let envelope = match submission.state {
                SubmissionState::Expired => ErrorEnvelope::expired(),
                SubmissionState::Cancelled => ErrorEnvelope::cancelled(),
                state => ErrorEnvelope::conflict(format!(
                    "operation not allowed in state `{state}`"
                )),
            };
            return Ok(Outcome::Refused(
                envelope.with_submission(&submission.id, submission.state),
            ));
        }

        if !submission.resume_token.matches(token) {
            return Ok(Outcome::Refused(
                ErrorEnvelope::invalid_resume_token()
                    .with_submission(&submission.id, submission.state),
            ));
        }

        if submission.is_expired(self.clock.now()) {
            self.force_expire(&mut submission).await?;
            return Ok(Outcome::Refused(
                ErrorEnvelope::expired().with_submission(&submission.id, submission.state),
            ));
        }

        Ok(Outcome::Accepted(submission))
    }

    async fn force_expire(&self, submission: &mut Submission) -> Result<(), EngineError> {
        let now = self.clock.now();
        SubmissionStateMachine::assert_valid_transition(
            submission.state,
            SubmissionState::Expired,
        )?;
        submission.state = SubmissionState::Expired;
        submission.rotate_token();
        let actor = Actor::system("formbridge-expiry");
        submission.updated_at = now;
        submission.updated_by = actor.clone();

        let expired = Event::record(
            &submission.id,
            &actor,
            submission.state,
            EventType::SubmissionExpired,
            None,
            now,
        );
        self.storage.commit(submission, vec![expired]).await?;

        info!(submission_id = %submission.id, "submission expired");
        Ok(())
    }

    fn intake_for(
        &self,
        submission: &Submission,
    ) -> Result<Arc<fb_domain::IntakeDefinition>, EngineError> {
        self.registry
            .get(&submission.intake_id)
            .ok_or_else(|| EngineError::IntakeMissing {
                intake_id: submission.intake_id.clone(),
            })
    }

    /// Best-effort reviewer notification: a missing or failing notifier
    /// never breaks the triggering operation.
    async fn notify_reviewers(
        &self,
        intake_id: &str,
        intake_name: &str,
        submission: &Submission,
        gates: &[String],
    ) {
        match &self.notifier {
            None => warn!(
                submission_id = %submission.id,
                "no reviewer notifier configured; skipping notification"
            ),
            Some(notifier) => {
                let notice = ReviewNotice {
                    submission_id: submission.id.clone(),
                    intake_id: intake_id.to_string(),
                    intake_name: intake_name.to_string(),
                    gates: gates.to_vec(),
                    requested_at: self.clock.now(),
                };
                if let Err(e) = notifier.notify(&notice).await {
                    warn!(
                        submission_id = %submission.id,
                        error = %e,
                        "reviewer notification failed"
                    );
                }
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn reserved_path_refusal(fields: &fb_domain::FieldMap) -> Option<ErrorEnvelope> {
    let reserved = reserved_paths(fields);
    if reserved.is_empty() {
        return None;
    }
    let errors = reserved
        .into_iter()
        .map(|path| {
            FieldError::new(
                path,
                fb_domain::FieldErrorCode::InvalidValue,
                "field path is reserved",
            )
        })
        .collect();
    Some(ErrorEnvelope::validation(errors, Vec::new()))
}

fn collect_actions(errors: &[FieldError]) -> Vec<NextAction> {
    errors
        .iter()
        .map(|error| NextAction::CollectField {
            field: error.path.clone(),
        })
        .collect()
}

fn replay_submit(submission: &Submission, outcome: &RecordedSubmit) -> Outcome<SubmitReply> {
    match outcome {
        RecordedSubmit::Accepted {
            state,
            resume_token,
        } => Outcome::Accepted(SubmitReply {
            submission_id: submission.id.clone(),
            state: *state,
            resume_token: resume_token.clone(),
        }),
        RecordedSubmit::NeedsApproval {
            gates,
            resume_token,
        } => Outcome::Refused(
            ErrorEnvelope::needs_approval(gates)
                .with_submission(&submission.id, SubmissionState::NeedsReview)
                .with_resume_token(resume_token.clone()),
        ),
    }
}
