//! Service configuration from the environment
//!
//! Recognized variables:
//! - `FORMBRIDGE_BIND_ADDR` (default `0.0.0.0:3000`)
//! - `FORMBRIDGE_BASE_URL` (default `http://localhost:3000`; embedded in
//!   handoff links)
//! - `FORMBRIDGE_STORAGE` (`memory` | `sled:<path>`)
//! - `FORMBRIDGE_INTAKES` (optional path to a JSON array of intake
//!   definitions registered at startup)
//! - `FORMBRIDGE_WEBHOOK_SECRET` / `FORMBRIDGE_REVIEWER_WEBHOOK_URL`
//!   (read by the delivery and notifier adapters)

use fb_adapters::StorageChoice;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub base_url: String,
    pub storage: StorageChoice,
    pub intakes_path: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("FORMBRIDGE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            base_url: std::env::var("FORMBRIDGE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            storage: StorageChoice::from_env(),
            intakes_path: std::env::var("FORMBRIDGE_INTAKES").ok(),
        }
    }
}
