//! Delivery engine
//!
//! Forwards submitted submissions to their intake's destination,
//! at-least-once, with exponential backoff. On success the submission
//! finalizes; after the last attempt it stays in `submitted` with a
//! persistent delivery error so operators can act — a delivery is never
//! dropped without a terminal `delivery.failed` event.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use fb_domain::{
    Actor, Event, EventType, SubmissionId, SubmissionState, SubmissionStateMachine,
};
use fb_ports::{Clock, DeliveryPayload, DeliveryTransport, Storage};

use crate::error::EngineError;
use crate::locks::SubmissionLocks;
use crate::registry::IntakeRegistry;

/// Backoff parameters for delivery retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Delay scheduled after the given (1-based) failed attempt.
    pub fn delay_after_attempt(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent as i32);
        (delay as u64).min(self.max_delay_ms)
    }
}

#[derive(Debug, Clone)]
struct DeliveryJob {
    submission_id: SubmissionId,
    intake_id: String,
    attempt: u32,
    next_attempt_at: DateTime<Utc>,
}

pub struct DeliveryEngine {
    storage: Arc<dyn Storage>,
    registry: Arc<IntakeRegistry>,
    transport: Option<Arc<dyn DeliveryTransport>>,
    locks: Arc<SubmissionLocks>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    queue: Mutex<Vec<DeliveryJob>>,
}

impl DeliveryEngine {
    pub(crate) fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<IntakeRegistry>,
        transport: Option<Arc<dyn DeliveryTransport>>,
        locks: Arc<SubmissionLocks>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            registry,
            transport,
            locks,
            clock,
            policy,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Schedule the first delivery attempt for a submitted submission.
    pub fn enqueue(&self, submission_id: &SubmissionId, intake_id: &str) {
        let job = DeliveryJob {
            submission_id: submission_id.clone(),
            intake_id: intake_id.to_string(),
            attempt: 1,
            next_attempt_at: self.clock.now(),
        };
        debug!(submission_id = %submission_id, "delivery enqueued");
        self.queue.lock().expect("delivery queue poisoned").push(job);
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().expect("delivery queue poisoned").len()
    }

    /// Process every job whose retry time has arrived. The background
    /// runner loops this; tests call it directly for determinism.
    pub async fn tick(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let due: Vec<DeliveryJob> = {
            let mut queue = self.queue.lock().expect("delivery queue poisoned");
            let (ready, waiting): (Vec<_>, Vec<_>) =
                queue.drain(..).partition(|job| job.next_attempt_at <= now);
            *queue = waiting;
            ready
        };

        let count = due.len();
        for job in due {
            self.attempt(job).await?;
        }
        Ok(count)
    }

    /// Loop [`DeliveryEngine::tick`] until the process shuts down.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(250));
            loop {
                interval.tick().await;
                if let Err(e) = self.tick().await {
                    error!(error = %e, "delivery tick failed");
                }
            }
        })
    }

    #[instrument(skip(self, job), fields(submission_id = %job.submission_id, attempt = job.attempt))]
    async fn attempt(&self, job: DeliveryJob) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(&job.submission_id).await;

        let Some(mut submission) = self.storage.get_submission(&job.submission_id).await? else {
            warn!(submission_id = %job.submission_id, "delivery target vanished; dropping job");
            return Ok(());
        };
        if submission.state != SubmissionState::Submitted {
            // Cancelled while queued; nothing to deliver.
            debug!(state = %submission.state, "skipping delivery for non-submitted state");
            return Ok(());
        }

        let Some(intake) = self.registry.get(&job.intake_id) else {
            return Err(EngineError::IntakeMissing {
                intake_id: job.intake_id.clone(),
            });
        };

        let actor = Actor::system("formbridge-delivery");
        let now = self.clock.now();

        let attempted = Event::record(
            &submission.id,
            &actor,
            submission.state,
            EventType::DeliveryAttempted,
            Some(json!({
                "attempt": job.attempt,
                "destination": intake.destination.kind(),
            })),
            now,
        );
        self.storage.append_event(attempted).await?;

        let payload = DeliveryPayload {
            submission_id: submission.id.clone(),
            intake_id: submission.intake_id.clone(),
            fields: submission.fields.clone(),
            submitted_at: submission.updated_at,
            attempt: job.attempt,
        };

        let result = match &self.transport {
            Some(transport) => transport.deliver(&intake.destination, &payload).await,
            None => Err(fb_ports::DeliveryError::Unsupported {
                kind: "no delivery transport configured".to_string(),
            }),
        };

        match result {
            Ok(()) => {
                SubmissionStateMachine::assert_valid_transition(
                    submission.state,
                    SubmissionState::Finalized,
                )?;
                submission.state = SubmissionState::Finalized;
                submission.rotate_token();
                submission.updated_at = now;
                submission.updated_by = actor.clone();
                submission.delivery_error = None;

                let succeeded = Event::record(
                    &submission.id,
                    &actor,
                    submission.state,
                    EventType::DeliverySucceeded,
                    Some(json!({ "attempt": job.attempt })),
                    now,
                );
                let finalized = Event::record(
                    &submission.id,
                    &actor,
                    submission.state,
                    EventType::SubmissionFinalized,
                    None,
                    now,
                );
                self.storage
                    .commit(&submission, vec![succeeded, finalized])
                    .await?;

                info!(submission_id = %submission.id, attempt = job.attempt, "delivery succeeded");
            }
            Err(e) if job.attempt < self.policy.max_attempts => {
                let retry_after_ms = self.policy.delay_after_attempt(job.attempt);
                let failed = Event::record(
                    &submission.id,
                    &actor,
                    submission.state,
                    EventType::DeliveryFailed,
                    Some(json!({
                        "attempt": job.attempt,
                        "reason": e.to_string(),
                        "retryable": true,
                        "retryAfterMs": retry_after_ms,
                    })),
                    now,
                );
                self.storage.append_event(failed).await?;

                warn!(
                    submission_id = %submission.id,
                    attempt = job.attempt,
                    retry_after_ms,
                    error = %e,
                    "delivery failed; rescheduling"
                );

                let retry = DeliveryJob {
                    attempt: job.attempt + 1,
                    next_attempt_at: now + ChronoDuration::milliseconds(retry_after_ms as i64),
                    ..job
                };
                self.queue
                    .lock()
                    .expect("delivery queue poisoned")
                    .push(retry);
            }
            Err(e) => {
                // Retry budget exhausted. The submission is not wedged:
                // it stays in `submitted` and reads surface the failure.
                let failed = Event::record(
                    &submission.id,
                    &actor,
                    submission.state,
                    EventType::DeliveryFailed,
                    Some(json!({
                        "attempt": job.attempt,
                        "reason": e.to_string(),
                        "retryable": false,
                    })),
                    now,
                );
                self.storage.append_event(failed).await?;

                submission.delivery_error = Some(e.to_string());
                submission.updated_at = now;
                self.storage.save_submission(&submission).await?;

                error!(
                    submission_id = %submission.id,
                    attempts = job.attempt,
                    error = %e,
                    "delivery permanently failed"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after_attempt(1), 1_000);
        assert_eq!(policy.delay_after_attempt(2), 2_000);
        assert_eq!(policy.delay_after_attempt(3), 4_000);
        assert_eq!(policy.delay_after_attempt(4), 8_000);
        // 2^9 seconds would be 512s; capped at 60s.
        assert_eq!(policy.delay_after_attempt(10), 60_000);
    }

    #[test]
    fn first_attempt_uses_initial_delay() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 250,
            backoff_multiplier: 3.0,
            max_delay_ms: 10_000,
        };
        assert_eq!(policy.delay_after_attempt(1), 250);
        assert_eq!(policy.delay_after_attempt(2), 750);
        assert_eq!(policy.delay_after_attempt(3), 2_250);
    }
}
