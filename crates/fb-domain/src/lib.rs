//! FormBridge Domain Core
//!
//! This crate contains the pure domain logic for the submission lifecycle:
//! - Actors, ids, and rotating capability tokens
//! - The submission aggregate and its state machine
//! - Audit events and event filters
//! - Intake definitions (schema + policy)
//! - Schema validation with structured field errors and next-action hints
//! - The closed error taxonomy shared by every transport
//!
//! This crate MUST NOT import DB clients, HTTP frameworks, storage SDKs,
//! or an async runtime.

pub mod actor;
pub mod commands;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod fields;
pub mod ids;
pub mod intake;
pub mod schema;
pub mod state;
pub mod submission;
pub mod token;
pub mod validator;

pub use actor::*;
pub use commands::*;
pub use envelope::*;
pub use errors::*;
pub use events::*;
pub use fields::*;
pub use ids::*;
pub use intake::*;
pub use schema::*;
pub use state::*;
pub use submission::*;
pub use token::*;
pub use validator::*;
