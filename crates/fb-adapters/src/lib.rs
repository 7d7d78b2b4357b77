//! FormBridge Adapters
//!
//! Concrete implementations of the `fb-ports` traits:
//! - [`memory::InMemoryStorage`]: reference storage backend
//! - [`sled_store::SledStorage`]: embedded-KV storage backend
//! - [`object_memory::InMemoryObjectStore`]: upload backend for tests and
//!   single-process deployments
//! - [`s3::S3ObjectStore`]: presigned-URL uploads against S3/MinIO
//! - [`webhook::WebhookDeliveryTransport`] and
//!   [`webhook::RoutingDeliveryTransport`]: outbound delivery
//! - [`notifier::WebhookReviewerNotifier`]: reviewer notifications

pub mod config;
pub mod memory;
pub mod notifier;
pub mod object_memory;
pub mod s3;
pub mod sled_store;
pub mod webhook;

pub use config::*;
pub use memory::*;
pub use notifier::*;
pub use object_memory::*;
pub use s3::*;
pub use sled_store::*;
pub use webhook::*;
