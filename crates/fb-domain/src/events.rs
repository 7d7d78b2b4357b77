//! Audit events
//!
//! Every submission carries an append-only, per-submission versioned
//! event stream. Events are an audit artifact: no component reads event
//! payloads to infer current state, which lives on the submission record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::{Actor, ActorKind};
use crate::ids::{EventId, SubmissionId};
use crate::state::SubmissionState;

/// Event types, serialized as the dotted names used in exports and
/// filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "submission.created")]
    SubmissionCreated,
    #[serde(rename = "field.updated")]
    FieldUpdated,
    /// Batched form of `field.updated`. Kept in the enum for imports;
    /// this implementation always emits the singular form.
    #[serde(rename = "fields.updated")]
    FieldsUpdated,
    #[serde(rename = "validation.passed")]
    ValidationPassed,
    #[serde(rename = "validation.failed")]
    ValidationFailed,
    #[serde(rename = "upload.requested")]
    UploadRequested,
    #[serde(rename = "upload.completed")]
    UploadCompleted,
    #[serde(rename = "upload.failed")]
    UploadFailed,
    #[serde(rename = "submission.submitted")]
    SubmissionSubmitted,
    #[serde(rename = "review.requested")]
    ReviewRequested,
    #[serde(rename = "review.approved")]
    ReviewApproved,
    #[serde(rename = "review.rejected")]
    ReviewRejected,
    #[serde(rename = "review.changes_requested")]
    ReviewChangesRequested,
    #[serde(rename = "delivery.attempted")]
    DeliveryAttempted,
    #[serde(rename = "delivery.succeeded")]
    DeliverySucceeded,
    #[serde(rename = "delivery.failed")]
    DeliveryFailed,
    #[serde(rename = "submission.finalized")]
    SubmissionFinalized,
    #[serde(rename = "submission.cancelled")]
    SubmissionCancelled,
    #[serde(rename = "submission.expired")]
    SubmissionExpired,
    #[serde(rename = "handoff.link_issued")]
    HandoffLinkIssued,
    #[serde(rename = "handoff.resumed")]
    HandoffResumed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SubmissionCreated => "submission.created",
            EventType::FieldUpdated => "field.updated",
            EventType::FieldsUpdated => "fields.updated",
            EventType::ValidationPassed => "validation.passed",
            EventType::ValidationFailed => "validation.failed",
            EventType::UploadRequested => "upload.requested",
            EventType::UploadCompleted => "upload.completed",
            EventType::UploadFailed => "upload.failed",
            EventType::SubmissionSubmitted => "submission.submitted",
            EventType::ReviewRequested => "review.requested",
            EventType::ReviewApproved => "review.approved",
            EventType::ReviewRejected => "review.rejected",
            EventType::ReviewChangesRequested => "review.changes_requested",
            EventType::DeliveryAttempted => "delivery.attempted",
            EventType::DeliverySucceeded => "delivery.succeeded",
            EventType::DeliveryFailed => "delivery.failed",
            EventType::SubmissionFinalized => "submission.finalized",
            EventType::SubmissionCancelled => "submission.cancelled",
            EventType::SubmissionExpired => "submission.expired",
            EventType::HandoffLinkIssued => "handoff.link_issued",
            EventType::HandoffResumed => "handoff.resumed",
        }
    }

    /// Parse the wire form used in event filters.
    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.to_string())).ok()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record in a submission's audit stream. Once written, never
/// modified or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: EventId,
    pub submission_id: SubmissionId,
    /// Assigned by the event store: `1..n` per submission, no gaps, no
    /// duplicates.
    pub version: u64,
    pub ts: DateTime<Utc>,
    pub actor: Actor,
    /// Submission state at the time the event was recorded.
    pub state: SubmissionState,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Event {
    /// Build an event awaiting version assignment by the store.
    pub fn record(
        submission_id: &SubmissionId,
        actor: &Actor,
        state: SubmissionState,
        event_type: EventType,
        payload: Option<Value>,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            submission_id: submission_id.clone(),
            version: 0,
            ts,
            actor: actor.clone(),
            state,
            event_type,
            payload,
        }
    }
}

/// Filter for event listing and export. `limit`/`offset` are applied
/// after the predicate filters, in version order.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub types: Option<Vec<EventType>>,
    pub actor_kind: Option<ActorKind>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl EventFilter {
    /// Predicate part of the filter; pagination is the caller's job.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(kind) = self.actor_kind {
            if event.actor.kind != kind {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.ts < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.ts > until {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics over the whole event store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogStats {
    pub total_events: u64,
    pub submission_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_event: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_event: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_round_trip_through_their_wire_names() {
        for event_type in [
            EventType::SubmissionCreated,
            EventType::FieldUpdated,
            EventType::UploadRequested,
            EventType::ReviewChangesRequested,
            EventType::DeliveryFailed,
            EventType::HandoffLinkIssued,
        ] {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::parse("submission.deleted"), None);
    }

    #[test]
    fn event_serializes_with_dotted_type() {
        let event = Event::record(
            &SubmissionId::from("sub_01TEST"),
            &Actor::agent("bot"),
            SubmissionState::Draft,
            EventType::SubmissionCreated,
            None,
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "submission.created");
        assert_eq!(json["state"], "draft");
        assert_eq!(json["submissionId"], "sub_01TEST");
    }

    #[test]
    fn filter_narrows_by_type_and_actor_kind() {
        let event = Event::record(
            &SubmissionId::new(),
            &Actor::human("alice"),
            SubmissionState::InProgress,
            EventType::FieldUpdated,
            None,
            Utc::now(),
        );

        let mut filter = EventFilter::default();
        assert!(filter.matches(&event));

        filter.types = Some(vec![EventType::FieldUpdated]);
        filter.actor_kind = Some(ActorKind::Human);
        assert!(filter.matches(&event));

        filter.actor_kind = Some(ActorKind::Agent);
        assert!(!filter.matches(&event));
    }

    #[test]
    fn filter_narrows_by_time_window() {
        let ts = Utc::now();
        let event = Event::record(
            &SubmissionId::new(),
            &Actor::system("sweeper"),
            SubmissionState::Expired,
            EventType::SubmissionExpired,
            None,
            ts,
        );

        let filter = EventFilter {
            since: Some(ts - chrono::Duration::seconds(1)),
            until: Some(ts + chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        let filter = EventFilter {
            since: Some(ts + chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!filter.matches(&event));
    }
}
