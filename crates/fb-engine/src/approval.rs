//! Approval manager
//!
//! Drives `needs_review → approved/rejected/draft` decisions. Each
//! operation verifies the reviewer's resume token, records a
//! ReviewDecision, emits its event, and rotates the token. Approval
//! chains straight into `submitted` and enqueues delivery; request-changes
//! returns the submission to `draft` so the review loop is re-entrant.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use fb_domain::{
    ApproveSubmission, ErrorEnvelope, Event, EventType, Outcome, RejectSubmission, RequestChanges,
    ReviewAction, ReviewDecision, Submission, SubmissionId, SubmissionState,
    SubmissionStateMachine,
};
use fb_ports::{Clock, Storage};

use crate::delivery::DeliveryEngine;
use crate::error::{accept, OpResult};
use crate::locks::SubmissionLocks;

pub struct ApprovalManager {
    storage: Arc<dyn Storage>,
    delivery: Arc<DeliveryEngine>,
    locks: Arc<SubmissionLocks>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReply {
    pub submission_id: SubmissionId,
    pub state: SubmissionState,
    pub resume_token: String,
}

impl ApprovalManager {
    pub(crate) fn new(
        storage: Arc<dyn Storage>,
        delivery: Arc<DeliveryEngine>,
        locks: Arc<SubmissionLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            delivery,
            locks,
            clock,
        }
    }

    #[instrument(skip(self, cmd), fields(submission_id = %cmd.submission_id, reviewer = %cmd.actor.id))]
    pub async fn approve(&self, cmd: ApproveSubmission) -> OpResult<ReviewReply> {
        let _guard = self.locks.acquire(&cmd.submission_id).await;
        let mut submission = accept!(
            self.open_review(&cmd.submission_id, &cmd.resume_token)
                .await?
        );

        let now = self.clock.now();
        submission.review_decisions.push(ReviewDecision {
            action: ReviewAction::Approve,
            actor: cmd.actor.clone(),
            timestamp: now,
            comment: cmd.comment.clone(),
            reason: None,
            field_comments: Vec::new(),
        });

        SubmissionStateMachine::assert_valid_transition(
            submission.state,
            SubmissionState::Approved,
        )?;
        submission.state = SubmissionState::Approved;
        let approved = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::ReviewApproved,
            cmd.comment.as_ref().map(|c| json!({ "comment": c })),
            now,
        );

        // Approval flows straight on into delivery.
        SubmissionStateMachine::assert_valid_transition(
            submission.state,
            SubmissionState::Submitted,
        )?;
        submission.state = SubmissionState::Submitted;
        let submitted = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::SubmissionSubmitted,
            Some(json!({ "via": "approval" })),
            now,
        );

        submission.rotate_token();
        submission.updated_at = now;
        submission.updated_by = cmd.actor.clone();
        self.storage
            .commit(&submission, vec![approved, submitted])
            .await?;

        self.delivery
            .enqueue(&submission.id, &submission.intake_id);

        info!(submission_id = %submission.id, "submission approved");

        Ok(Outcome::Accepted(ReviewReply {
            submission_id: submission.id.clone(),
            state: submission.state,
            resume_token: submission.resume_token.as_str().to_string(),
        }))
    }

    #[instrument(skip(self, cmd), fields(submission_id = %cmd.submission_id, reviewer = %cmd.actor.id))]
    pub async fn reject(&self, cmd: RejectSubmission) -> OpResult<ReviewReply> {
        let _guard = self.locks.acquire(&cmd.submission_id).await;
        let mut submission = accept!(
            self.open_review(&cmd.submission_id, &cmd.resume_token)
                .await?
        );

        let now = self.clock.now();
        submission.review_decisions.push(ReviewDecision {
            action: ReviewAction::Reject,
            actor: cmd.actor.clone(),
            timestamp: now,
            comment: cmd.comment.clone(),
            reason: Some(cmd.reason.clone()),
            field_comments: Vec::new(),
        });

        SubmissionStateMachine::assert_valid_transition(
            submission.state,
            SubmissionState::Rejected,
        )?;
        submission.state = SubmissionState::Rejected;
        submission.rotate_token();
        submission.updated_at = now;
        submission.updated_by = cmd.actor.clone();

        let rejected = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::ReviewRejected,
            Some(json!({ "reason": &cmd.reason, "comment": &cmd.comment })),
            now,
        );
        self.storage.commit(&submission, vec![rejected]).await?;

        info!(submission_id = %submission.id, reason = %cmd.reason, "submission rejected");

        Ok(Outcome::Accepted(ReviewReply {
            submission_id: submission.id.clone(),
            state: submission.state,
            resume_token: submission.resume_token.as_str().to_string(),
        }))
    }

    /// Bounce the submission back to `draft` with per-field feedback so
    /// the original actors can correct and resubmit.
    #[instrument(skip(self, cmd), fields(submission_id = %cmd.submission_id, reviewer = %cmd.actor.id))]
    pub async fn request_changes(&self, cmd: RequestChanges) -> OpResult<ReviewReply> {
        let _guard = self.locks.acquire(&cmd.submission_id).await;
        let mut submission = accept!(
            self.open_review(&cmd.submission_id, &cmd.resume_token)
                .await?
        );

        let now = self.clock.now();
        submission.review_decisions.push(ReviewDecision {
            action: ReviewAction::RequestChanges,
            actor: cmd.actor.clone(),
            timestamp: now,
            comment: cmd.comment.clone(),
            reason: None,
            field_comments: cmd.field_comments.clone(),
        });

        SubmissionStateMachine::assert_valid_transition(submission.state, SubmissionState::Draft)?;
        submission.state = SubmissionState::Draft;
        submission.rotate_token();
        submission.updated_at = now;
        submission.updated_by = cmd.actor.clone();

        let changes = Event::record(
            &submission.id,
            &cmd.actor,
            submission.state,
            EventType::ReviewChangesRequested,
            Some(json!({
                "fieldComments": &cmd.field_comments,
                "comment": &cmd.comment,
            })),
            now,
        );
        self.storage.commit(&submission, vec![changes]).await?;

        info!(submission_id = %submission.id, "changes requested");

        Ok(Outcome::Accepted(ReviewReply {
            submission_id: submission.id.clone(),
            state: submission.state,
            resume_token: submission.resume_token.as_str().to_string(),
        }))
    }

    async fn open_review(&self, id: &SubmissionId, token: &str) -> OpResult<Submission> {
        let Some(submission) = self.storage.get_submission(id).await? else {
            return Ok(Outcome::Refused(ErrorEnvelope::not_found(format!(
                "submission `{id}` not found"
            ))));
        };

        if submission.state != SubmissionState::NeedsReview {
            return Ok(Outcome::Refused(
                ErrorEnvelope::conflict(format!(
                    "review decisions require state `needs_review`, found `{}`",
                    submission.state
                ))
                .with_submission(&submission.id, submission.state),
            ));
        }

        if !submission.resume_token.matches(token) {
            return Ok(Outcome::Refused(
                ErrorEnvelope::invalid_resume_token()
                    .with_submission(&submission.id, submission.state),
            ));
        }

        Ok(Outcome::Accepted(submission))
    }
}
