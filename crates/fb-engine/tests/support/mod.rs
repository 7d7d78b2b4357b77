//! Shared harness for engine integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use fb_adapters::{InMemoryObjectStore, InMemoryStorage};
use fb_domain::{
    ApprovalGate, Destination, FieldMap, FieldSpec, IntakeDefinition, IntakeSchema, SubmissionId,
    UploadId,
};
use fb_engine::{Engine, RetryPolicy};
use fb_ports::{Clock, DeliveryError, DeliveryPayload, DeliveryTransport, ObjectKey};

/// Test clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc::now()),
        })
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::milliseconds(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Delivery transport that fails a scripted number of times, then
/// records every successful delivery.
#[derive(Default)]
pub struct ScriptedTransport {
    failures_remaining: Mutex<u32>,
    delivered: Mutex<Vec<DeliveryPayload>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, times: u32) {
        *self.failures_remaining.lock().unwrap() = times;
    }

    pub fn delivered(&self) -> Vec<DeliveryPayload> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryTransport for ScriptedTransport {
    async fn deliver(
        &self,
        _destination: &Destination,
        payload: &DeliveryPayload,
    ) -> Result<(), DeliveryError> {
        {
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(DeliveryError::Transport {
                    message: "scripted failure".to_string(),
                });
            }
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub objects: Arc<InMemoryObjectStore>,
    pub transport: Arc<ScriptedTransport>,
}

impl Harness {
    pub fn with_intakes(intakes: Vec<IntakeDefinition>) -> Self {
        Self::with_intakes_and_policy(intakes, RetryPolicy::default())
    }

    pub fn with_intakes_and_policy(intakes: Vec<IntakeDefinition>, policy: RetryPolicy) -> Self {
        let clock = ManualClock::new();
        let objects = Arc::new(InMemoryObjectStore::new());
        let transport = ScriptedTransport::new();

        let engine = Engine::builder(Arc::new(InMemoryStorage::new()))
            .objects(objects.clone())
            .transport(transport.clone())
            .clock(clock.clone())
            .retry_policy(policy)
            .base_url("https://forms.example.test")
            .build();

        for intake in intakes {
            engine.registry.register(intake, false).expect("register intake");
        }

        Harness {
            engine,
            clock,
            objects,
            transport,
        }
    }

    pub fn object_key(&self, intake_id: &str, submission_id: &SubmissionId, field_path: &str, upload_id: &UploadId) -> ObjectKey {
        ObjectKey {
            intake_id: intake_id.to_string(),
            submission_id: submission_id.clone(),
            field_path: field_path.to_string(),
            upload_id: upload_id.clone(),
        }
    }
}

pub fn contact_form() -> IntakeDefinition {
    IntakeDefinition {
        id: "contact_form".to_string(),
        version: 1,
        name: "Contact form".to_string(),
        schema: IntakeSchema::new()
            .with_field("name", FieldSpec::string().required())
            .with_field("email", FieldSpec::email().required())
            .with_field("message", FieldSpec::string().required()),
        approval_gates: vec![],
        ttl_ms: None,
        destination: Destination::Webhook {
            url: "https://example.test/hook".to_string(),
        },
        ui_hints: None,
    }
}

pub fn vendor_onboarding() -> IntakeDefinition {
    IntakeDefinition {
        id: "vendor_onboarding".to_string(),
        version: 1,
        name: "Vendor onboarding".to_string(),
        schema: IntakeSchema::new()
            .with_field("name", FieldSpec::string().required())
            .with_field("address", FieldSpec::string().required())
            .with_field("taxId", FieldSpec::string().required())
            .with_field(
                "w9",
                FieldSpec::file(vec!["application/pdf".to_string()], 5 * 1024 * 1024),
            ),
        approval_gates: vec![ApprovalGate::named("compliance")],
        ttl_ms: None,
        destination: Destination::Webhook {
            url: "https://example.test/vendors".to_string(),
        },
        ui_hints: None,
    }
}

pub fn fields(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
