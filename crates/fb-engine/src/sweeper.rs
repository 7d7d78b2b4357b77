//! TTL expiry sweeper
//!
//! Periodic background task: lists non-terminal submissions past their
//! deadline and issues expire transitions. Running over an
//! already-terminal submission is a no-op and emits no event.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use fb_ports::{Clock, Storage};

use crate::error::EngineError;
use crate::manager::SubmissionManager;

pub struct ExpirySweeper {
    storage: Arc<dyn Storage>,
    manager: Arc<SubmissionManager>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ExpirySweeper {
    pub(crate) fn new(
        storage: Arc<dyn Storage>,
        manager: Arc<SubmissionManager>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            manager,
            clock,
            interval,
        }
    }

    /// One pass over the store. Returns how many submissions expired.
    pub async fn sweep_once(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let candidates = self.storage.list_expired(now).await?;
        let mut expired = 0;
        for id in candidates {
            if self.manager.expire(&id).await? {
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "expiry sweep transitioned submissions");
        } else {
            debug!("expiry sweep found nothing to do");
        }
        Ok(expired)
    }

    /// Loop [`ExpirySweeper::sweep_once`] until the process shuts down.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.sweep_once().await {
                    error!(error = %e, "expiry sweep failed");
                }
            }
        })
    }
}
