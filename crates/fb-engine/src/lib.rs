//! FormBridge Protocol Engine
//!
//! The coordination layer between the domain core and the adapters:
//! - [`registry::IntakeRegistry`]: validated intake definitions
//! - [`event_log::EventLog`]: append/list/export over the event store
//! - [`manager::SubmissionManager`]: the seven lifecycle operations
//! - [`approval::ApprovalManager`]: reviewer decisions
//! - [`delivery::DeliveryEngine`]: durable delivery with backoff
//! - [`sweeper::ExpirySweeper`]: TTL enforcement
//!
//! [`Engine::builder`] wires the pieces together over a storage backend.

use std::sync::Arc;
use std::time::Duration;

use fb_ports::{Clock, DeliveryTransport, ObjectStore, ReviewerNotifier, Storage, SystemClock};

pub mod approval;
pub mod delivery;
pub mod error;
pub mod event_log;
pub mod locks;
pub mod manager;
pub mod registry;
pub mod sweeper;
pub mod view;

pub use approval::*;
pub use delivery::*;
pub use error::*;
pub use event_log::*;
pub use locks::*;
pub use manager::*;
pub use registry::*;
pub use sweeper::*;
pub use view::*;

/// A fully wired engine.
pub struct Engine {
    pub registry: Arc<IntakeRegistry>,
    pub event_log: Arc<EventLog>,
    pub manager: Arc<SubmissionManager>,
    pub approvals: Arc<ApprovalManager>,
    pub delivery: Arc<DeliveryEngine>,
    pub sweeper: Arc<ExpirySweeper>,
}

impl Engine {
    pub fn builder(storage: Arc<dyn Storage>) -> EngineBuilder {
        EngineBuilder {
            storage,
            registry: Arc::new(IntakeRegistry::new()),
            objects: None,
            transport: None,
            notifier: None,
            clock: Arc::new(SystemClock),
            retry_policy: RetryPolicy::default(),
            sweep_interval: Duration::from_secs(30),
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

pub struct EngineBuilder {
    storage: Arc<dyn Storage>,
    registry: Arc<IntakeRegistry>,
    objects: Option<Arc<dyn ObjectStore>>,
    transport: Option<Arc<dyn DeliveryTransport>>,
    notifier: Option<Arc<dyn ReviewerNotifier>>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    sweep_interval: Duration,
    base_url: String,
}

impl EngineBuilder {
    pub fn registry(mut self, registry: Arc<IntakeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn DeliveryTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn ReviewerNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Base URL embedded in handoff links.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn build(self) -> Engine {
        let locks = Arc::new(SubmissionLocks::new());
        let event_log = Arc::new(EventLog::new(self.storage.clone()));

        let delivery = Arc::new(DeliveryEngine::new(
            self.storage.clone(),
            self.registry.clone(),
            self.transport,
            locks.clone(),
            self.clock.clone(),
            self.retry_policy,
        ));

        let manager = Arc::new(SubmissionManager::new(
            self.storage.clone(),
            self.registry.clone(),
            self.objects,
            delivery.clone(),
            locks.clone(),
            self.clock.clone(),
            self.notifier,
            self.base_url,
        ));

        let approvals = Arc::new(ApprovalManager::new(
            self.storage.clone(),
            delivery.clone(),
            locks,
            self.clock.clone(),
        ));

        let sweeper = Arc::new(ExpirySweeper::new(
            self.storage,
            manager.clone(),
            self.clock,
            self.sweep_interval,
        ));

        Engine {
            registry: self.registry,
            event_log,
            manager,
            approvals,
            delivery,
            sweeper,
        }
    }
}
