//! Per-submission write locks
//!
//! One writer at a time per submission; readers never take the lock and
//! may observe state strictly between two committed writes, never a torn
//! one (the storage upsert is atomic). Locks for different submissions
//! are independent, so submissions process in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use fb_domain::SubmissionId;

#[derive(Default)]
pub struct SubmissionLocks {
    locks: Mutex<HashMap<SubmissionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubmissionLocks {
    /// Registry size that triggers an eviction sweep on the next
    /// acquire. Keeps the map bounded by the number of concurrently
    /// locked submissions, not by lifetime submission volume.
    const EVICT_THRESHOLD: usize = 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for one submission. The guard is held for
    /// the duration of a state-mutating operation and released before
    /// the response is produced.
    pub async fn acquire(&self, id: &SubmissionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("submission lock registry poisoned");
            if locks.len() >= Self::EVICT_THRESHOLD {
                // Strong count 1 means only the registry holds the lock:
                // no guard out, no waiter. Handles are only cloned under
                // this mutex, so the check cannot race a pending lock.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of registry entries currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .expect("submission lock registry poisoned")
            .len()
    }
}
