//! In-memory storage backend
//!
//! Reference implementation of the storage façade. One mutex guards the
//! whole map, which makes `commit` trivially atomic; writers are already
//! serialized per submission by the engine.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fb_domain::{Event, EventFilter, EventLogStats, Submission, SubmissionId};
use fb_ports::{Storage, StorageError};

#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    submissions: HashMap<SubmissionId, Submission>,
    /// Current token per submission, so rotations evict stale index rows.
    current_token: HashMap<SubmissionId, String>,
    token_index: HashMap<String, SubmissionId>,
    idempotency_index: HashMap<String, SubmissionId>,
    events: HashMap<SubmissionId, Vec<Event>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn index_submission(&mut self, submission: &Submission) {
        let token = submission.resume_token.as_str().to_string();
        if let Some(previous) = self
            .current_token
            .insert(submission.id.clone(), token.clone())
        {
            if previous != token {
                self.token_index.remove(&previous);
            }
        }
        self.token_index.insert(token, submission.id.clone());

        for key in submission.idempotency_keys.keys() {
            self.idempotency_index
                .insert(key.clone(), submission.id.clone());
        }

        self.submissions
            .insert(submission.id.clone(), submission.clone());
    }

    fn check_duplicates(&self, events: &[Event]) -> Result<(), StorageError> {
        for (i, event) in events.iter().enumerate() {
            let stream = self.events.get(&event.submission_id);
            let in_stream = stream
                .map(|s| s.iter().any(|e| e.event_id == event.event_id))
                .unwrap_or(false);
            let in_batch = events[..i].iter().any(|e| e.event_id == event.event_id);
            if in_stream || in_batch {
                return Err(StorageError::DuplicateEvent {
                    event_id: event.event_id.as_str().to_string(),
                });
            }
        }
        Ok(())
    }

    fn append(&mut self, mut event: Event) -> Event {
        let stream = self.events.entry(event.submission_id.clone()).or_default();
        event.version = stream.len() as u64 + 1;
        stream.push(event.clone());
        event
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StorageError> {
        let inner = self.inner.lock().expect("storage mutex poisoned");
        Ok(inner.submissions.get(id).cloned())
    }

    async fn get_by_resume_token(&self, token: &str) -> Result<Option<Submission>, StorageError> {
        let inner = self.inner.lock().expect("storage mutex poisoned");
        Ok(inner
            .token_index
            .get(token)
            .and_then(|id| inner.submissions.get(id))
            .cloned())
    }

    async fn get_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Submission>, StorageError> {
        let inner = self.inner.lock().expect("storage mutex poisoned");
        Ok(inner
            .idempotency_index
            .get(key)
            .and_then(|id| inner.submissions.get(id))
            .cloned())
    }

    async fn save_submission(&self, submission: &Submission) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("storage mutex poisoned");
        inner.index_submission(submission);
        Ok(())
    }

    async fn append_event(&self, event: Event) -> Result<Event, StorageError> {
        let mut inner = self.inner.lock().expect("storage mutex poisoned");
        inner.check_duplicates(std::slice::from_ref(&event))?;
        Ok(inner.append(event))
    }

    async fn commit(
        &self,
        submission: &Submission,
        events: Vec<Event>,
    ) -> Result<Vec<Event>, StorageError> {
        let mut inner = self.inner.lock().expect("storage mutex poisoned");
        // Validate first so a rejected append leaves nothing applied.
        inner.check_duplicates(&events)?;
        inner.index_submission(submission);
        Ok(events.into_iter().map(|e| inner.append(e)).collect())
    }

    async fn list_events(
        &self,
        submission_id: &SubmissionId,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StorageError> {
        let inner = self.inner.lock().expect("storage mutex poisoned");
        let stream = inner.events.get(submission_id);
        Ok(apply_filter(
            stream.map(|s| s.as_slice()).unwrap_or_default(),
            filter,
        ))
    }

    async fn event_stats(&self) -> Result<EventLogStats, StorageError> {
        let inner = self.inner.lock().expect("storage mutex poisoned");
        Ok(stats_over(inner.events.values().flatten()))
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<SubmissionId>, StorageError> {
        let inner = self.inner.lock().expect("storage mutex poisoned");
        Ok(inner
            .submissions
            .values()
            .filter(|s| !s.state.is_terminal() && s.is_expired(now))
            .map(|s| s.id.clone())
            .collect())
    }
}

/// Filter + paginate a version-ordered stream. Shared by both storage
/// backends.
pub(crate) fn apply_filter(stream: &[Event], filter: &EventFilter) -> Vec<Event> {
    let offset = filter.offset.unwrap_or(0);
    let limit = filter.limit.unwrap_or(usize::MAX);
    stream
        .iter()
        .filter(|e| filter.matches(e))
        .skip(offset)
        .take(limit)
        .cloned()
        .collect()
}

pub(crate) fn stats_over<'a>(events: impl Iterator<Item = &'a Event>) -> EventLogStats {
    let mut total = 0u64;
    let mut submissions = std::collections::HashSet::new();
    let mut oldest: Option<DateTime<Utc>> = None;
    let mut newest: Option<DateTime<Utc>> = None;

    for event in events {
        total += 1;
        submissions.insert(event.submission_id.clone());
        oldest = Some(oldest.map_or(event.ts, |t| t.min(event.ts)));
        newest = Some(newest.map_or(event.ts, |t| t.max(event.ts)));
    }

    EventLogStats {
        total_events: total,
        submission_count: submissions.len() as u64,
        oldest_event: oldest,
        newest_event: newest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fb_domain::{Actor, EventType, FieldMap, ResumeToken, SubmissionState};
    use std::collections::BTreeMap;

    fn submission() -> Submission {
        let actor = Actor::agent("bot");
        Submission {
            id: SubmissionId::new(),
            intake_id: "contact_form".to_string(),
            state: SubmissionState::Draft,
            resume_token: ResumeToken::generate(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            expires_at: None,
            fields: FieldMap::new(),
            field_attribution: BTreeMap::new(),
            uploads: BTreeMap::new(),
            created_by: actor.clone(),
            updated_by: actor,
            idempotency_keys: BTreeMap::new(),
            review_decisions: Vec::new(),
            delivery_error: None,
        }
    }

    fn event(submission: &Submission, event_type: EventType) -> Event {
        Event::record(
            &submission.id,
            &Actor::agent("bot"),
            submission.state,
            event_type,
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let storage = InMemoryStorage::new();
        let s = submission();
        storage.save_submission(&s).await.unwrap();

        let loaded = storage.get_submission(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, s.id);
        assert_eq!(loaded.intake_id, "contact_form");
    }

    #[tokio::test]
    async fn rotated_tokens_evict_the_old_index_row() {
        let storage = InMemoryStorage::new();
        let mut s = submission();
        storage.save_submission(&s).await.unwrap();

        let old_token = s.resume_token.as_str().to_string();
        s.rotate_token();
        storage.save_submission(&s).await.unwrap();

        assert!(storage
            .get_by_resume_token(&old_token)
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .get_by_resume_token(s.resume_token.as_str())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn versions_are_contiguous_from_one() {
        let storage = InMemoryStorage::new();
        let s = submission();
        storage.save_submission(&s).await.unwrap();

        for expected in 1..=3u64 {
            let stored = storage
                .append_event(event(&s, EventType::FieldUpdated))
                .await
                .unwrap();
            assert_eq!(stored.version, expected);
        }
    }

    #[tokio::test]
    async fn duplicate_event_ids_are_rejected() {
        let storage = InMemoryStorage::new();
        let s = submission();
        let e = event(&s, EventType::SubmissionCreated);

        storage.append_event(e.clone()).await.unwrap();
        let err = storage.append_event(e).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEvent { .. }));
    }

    #[tokio::test]
    async fn commit_applies_nothing_when_an_append_would_fail() {
        let storage = InMemoryStorage::new();
        let mut s = submission();
        let e = event(&s, EventType::SubmissionCreated);
        storage.commit(&s, vec![e.clone()]).await.unwrap();

        s.state = SubmissionState::InProgress;
        let err = storage.commit(&s, vec![e]).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEvent { .. }));

        // The submission upsert must not have been applied either.
        let loaded = storage.get_submission(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, SubmissionState::Draft);
    }

    #[tokio::test]
    async fn list_events_filters_and_paginates() {
        let storage = InMemoryStorage::new();
        let s = submission();
        storage.save_submission(&s).await.unwrap();
        storage
            .append_event(event(&s, EventType::SubmissionCreated))
            .await
            .unwrap();
        storage
            .append_event(event(&s, EventType::FieldUpdated))
            .await
            .unwrap();
        storage
            .append_event(event(&s, EventType::FieldUpdated))
            .await
            .unwrap();

        let only_fields = EventFilter {
            types: Some(vec![EventType::FieldUpdated]),
            ..Default::default()
        };
        let events = storage.list_events(&s.id, &only_fields).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.windows(2).all(|w| w[0].version < w[1].version));

        let paged = EventFilter {
            offset: Some(1),
            limit: Some(1),
            ..Default::default()
        };
        let events = storage.list_events(&s.id, &paged).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].version, 2);
    }

    #[tokio::test]
    async fn expired_scan_skips_terminal_submissions() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();

        let mut live = submission();
        live.expires_at = Some(now - chrono::Duration::seconds(1));
        storage.save_submission(&live).await.unwrap();

        let mut done = submission();
        done.expires_at = Some(now - chrono::Duration::seconds(1));
        done.state = SubmissionState::Cancelled;
        storage.save_submission(&done).await.unwrap();

        let expired = storage.list_expired(now).await.unwrap();
        assert_eq!(expired, vec![live.id]);
    }
}
