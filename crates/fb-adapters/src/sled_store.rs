//! Embedded-KV storage backend on sled
//!
//! Each submission is stored as a single record holding the aggregate
//! and its event stream, so the save+append pair is one atomic key
//! write. The token and idempotency indices are secondary trees updated
//! after the primary write and verified on read, which keeps a crash
//! between the two writes harmless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fb_domain::{Event, EventFilter, EventLogStats, Submission, SubmissionId};
use fb_ports::{Storage, StorageError};

use crate::memory::{apply_filter, stats_over};

pub struct SledStorage {
    submissions: sled::Tree,
    token_index: sled::Tree,
    idempotency_index: sled::Tree,
}

#[derive(Serialize, Deserialize)]
struct StoredSubmission {
    submission: Submission,
    events: Vec<Event>,
}

impl SledStorage {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(connection)?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            submissions: db.open_tree("submissions").map_err(connection)?,
            token_index: db.open_tree("token_index").map_err(connection)?,
            idempotency_index: db.open_tree("idempotency_index").map_err(connection)?,
        })
    }

    fn load(&self, id: &SubmissionId) -> Result<Option<StoredSubmission>, StorageError> {
        match self.submissions.get(id.as_str()).map_err(connection)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(serialization),
        }
    }

    fn store(&self, record: &StoredSubmission) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(record).map_err(serialization)?;
        self.submissions
            .insert(record.submission.id.as_str(), bytes)
            .map_err(connection)?;
        Ok(())
    }

    fn refresh_indices(
        &self,
        submission: &Submission,
        previous_token: Option<&str>,
    ) -> Result<(), StorageError> {
        let token = submission.resume_token.as_str();
        if let Some(old) = previous_token {
            if old != token {
                self.token_index.remove(old).map_err(connection)?;
            }
        }
        self.token_index
            .insert(token, submission.id.as_str())
            .map_err(connection)?;

        for key in submission.idempotency_keys.keys() {
            self.idempotency_index
                .insert(key.as_str(), submission.id.as_str())
                .map_err(connection)?;
        }
        Ok(())
    }

    fn check_duplicates(stream: &[Event], incoming: &[Event]) -> Result<(), StorageError> {
        for (i, event) in incoming.iter().enumerate() {
            let seen = stream.iter().any(|e| e.event_id == event.event_id)
                || incoming[..i].iter().any(|e| e.event_id == event.event_id);
            if seen {
                return Err(StorageError::DuplicateEvent {
                    event_id: event.event_id.as_str().to_string(),
                });
            }
        }
        Ok(())
    }

    fn write(
        &self,
        submission: &Submission,
        incoming: Vec<Event>,
    ) -> Result<Vec<Event>, StorageError> {
        let existing = self.load(&submission.id)?;
        let previous_token = existing
            .as_ref()
            .map(|r| r.submission.resume_token.as_str().to_string());
        let mut events = existing.map(|r| r.events).unwrap_or_default();

        Self::check_duplicates(&events, &incoming)?;

        let mut assigned = Vec::with_capacity(incoming.len());
        for mut event in incoming {
            event.version = events.len() as u64 + 1;
            events.push(event.clone());
            assigned.push(event);
        }

        self.store(&StoredSubmission {
            submission: submission.clone(),
            events,
        })?;
        self.refresh_indices(submission, previous_token.as_deref())?;
        Ok(assigned)
    }

    fn lookup_indexed(
        &self,
        index: &sled::Tree,
        key: &str,
    ) -> Result<Option<Submission>, StorageError> {
        match index.get(key).map_err(connection)? {
            None => Ok(None),
            Some(id_bytes) => {
                let id = SubmissionId::from_string(
                    String::from_utf8_lossy(&id_bytes).into_owned(),
                );
                Ok(self.load(&id)?.map(|r| r.submission))
            }
        }
    }

    fn scan(&self) -> impl Iterator<Item = Result<StoredSubmission, StorageError>> + '_ {
        self.submissions.iter().map(|entry| {
            let (_, bytes) = entry.map_err(connection)?;
            serde_json::from_slice(&bytes).map_err(serialization)
        })
    }
}

fn connection(e: sled::Error) -> StorageError {
    StorageError::Connection {
        message: e.to_string(),
    }
}

fn serialization(e: serde_json::Error) -> StorageError {
    StorageError::Serialization {
        message: e.to_string(),
    }
}

#[async_trait]
impl Storage for SledStorage {
    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StorageError> {
        Ok(self.load(id)?.map(|r| r.submission))
    }

    async fn get_by_resume_token(&self, token: &str) -> Result<Option<Submission>, StorageError> {
        // Verify against the record: a stale index row must not resolve.
        Ok(self
            .lookup_indexed(&self.token_index, token)?
            .filter(|s| s.resume_token.as_str() == token))
    }

    async fn get_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Submission>, StorageError> {
        Ok(self
            .lookup_indexed(&self.idempotency_index, key)?
            .filter(|s| s.idempotency_keys.contains_key(key)))
    }

    async fn save_submission(&self, submission: &Submission) -> Result<(), StorageError> {
        self.write(submission, Vec::new())?;
        Ok(())
    }

    async fn append_event(&self, event: Event) -> Result<Event, StorageError> {
        let record = self
            .load(&event.submission_id)?
            .map(|r| r.submission);
        match record {
            Some(submission) => {
                let mut assigned = self.write(&submission, vec![event])?;
                Ok(assigned.remove(0))
            }
            None => Err(StorageError::Connection {
                message: format!(
                    "cannot append event for unknown submission {}",
                    event.submission_id
                ),
            }),
        }
    }

    async fn commit(
        &self,
        submission: &Submission,
        events: Vec<Event>,
    ) -> Result<Vec<Event>, StorageError> {
        self.write(submission, events)
    }

    async fn list_events(
        &self,
        submission_id: &SubmissionId,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StorageError> {
        let events = self.load(submission_id)?.map(|r| r.events).unwrap_or_default();
        Ok(apply_filter(&events, filter))
    }

    async fn event_stats(&self) -> Result<EventLogStats, StorageError> {
        let mut all = Vec::new();
        for record in self.scan() {
            all.extend(record?.events);
        }
        Ok(stats_over(all.iter()))
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<SubmissionId>, StorageError> {
        let mut expired = Vec::new();
        for record in self.scan() {
            let submission = record?.submission;
            if !submission.state.is_terminal() && submission.is_expired(now) {
                expired.push(submission.id);
            }
        }
        Ok(expired)
    }
}
