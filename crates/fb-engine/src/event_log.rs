//! Event log service
//!
//! Append-only, per-submission versioned stream with filter and export.
//! Deduplication by event id is enforced by the store; this service
//! preserves that signal and adds the export formats.

use std::sync::Arc;

use fb_domain::{Event, EventFilter, EventLogStats, SubmissionId};
use fb_ports::{Storage, StorageError};

pub struct EventLog {
    storage: Arc<dyn Storage>,
}

/// Export encodings. JSONL is one event per line, for streaming to log
/// sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Jsonl,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(ExportFormat::Json),
            "jsonl" => Some(ExportFormat::Jsonl),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Jsonl => "application/x-ndjson",
        }
    }
}

impl EventLog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Append one event; the store assigns the next version and rejects
    /// duplicate event ids with [`StorageError::DuplicateEvent`].
    pub async fn append(&self, event: Event) -> Result<Event, StorageError> {
        self.storage.append_event(event).await
    }

    /// Events for one submission, version ascending.
    pub async fn list(
        &self,
        submission_id: &SubmissionId,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StorageError> {
        self.storage.list_events(submission_id, filter).await
    }

    pub async fn export(
        &self,
        submission_id: &SubmissionId,
        format: ExportFormat,
        filter: &EventFilter,
    ) -> Result<Vec<u8>, StorageError> {
        let events = self.list(submission_id, filter).await?;
        match format {
            ExportFormat::Json => serde_json::to_vec_pretty(&events).map_err(serialization),
            ExportFormat::Jsonl => {
                let mut out = Vec::new();
                for event in &events {
                    serde_json::to_writer(&mut out, event).map_err(serialization)?;
                    out.push(b'\n');
                }
                Ok(out)
            }
        }
    }

    /// Parse a JSONL export back into events. Dual of
    /// [`EventLog::export`] with [`ExportFormat::Jsonl`].
    pub fn parse_jsonl(bytes: &[u8]) -> Result<Vec<Event>, StorageError> {
        let text = std::str::from_utf8(bytes).map_err(|e| StorageError::Serialization {
            message: e.to_string(),
        })?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(serialization))
            .collect()
    }

    pub async fn stats(&self) -> Result<EventLogStats, StorageError> {
        self.storage.event_stats().await
    }
}

fn serialization(e: serde_json::Error) -> StorageError {
    StorageError::Serialization {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parse_is_closed() {
        assert_eq!(ExportFormat::parse("json"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::parse("jsonl"), Some(ExportFormat::Jsonl));
        assert_eq!(ExportFormat::parse("csv"), None);
    }
}
