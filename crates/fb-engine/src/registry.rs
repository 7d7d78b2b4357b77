//! Intake registry
//!
//! Owns the set of registered intake definitions. Pure lookup at request
//! time; validation happens once, at registration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use fb_domain::{IntakeDefinition, IntakeRegistrationError};

#[derive(Default)]
pub struct IntakeRegistry {
    intakes: RwLock<HashMap<String, Arc<IntakeDefinition>>>,
}

impl IntakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and admit a definition. Duplicate ids are rejected
    /// unless `allow_overwrite` is set.
    pub fn register(
        &self,
        definition: IntakeDefinition,
        allow_overwrite: bool,
    ) -> Result<(), IntakeRegistrationError> {
        definition.validate()?;

        let mut intakes = self.intakes.write().expect("intake registry poisoned");
        if !allow_overwrite && intakes.contains_key(&definition.id) {
            return Err(IntakeRegistrationError::DuplicateIntake {
                id: definition.id.clone(),
            });
        }

        info!(intake_id = %definition.id, version = definition.version, "intake registered");
        intakes.insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<IntakeDefinition>> {
        self.intakes
            .read()
            .expect("intake registry poisoned")
            .get(id)
            .cloned()
    }

    pub fn list(&self) -> Vec<Arc<IntakeDefinition>> {
        let mut all: Vec<_> = self
            .intakes
            .read()
            .expect("intake registry poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}
