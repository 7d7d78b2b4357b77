//! Engine errors and the operation result alias

use thiserror::Error;

use fb_domain::{DomainError, Outcome};
use fb_ports::{ObjectStoreError, StorageError};

/// Thrown engine errors: infrastructure failures and programmer errors.
/// Protocol refusals travel as [`fb_domain::ErrorEnvelope`] inside
/// [`Outcome::Refused`], never here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("object storage backend is not configured")]
    ObjectStoreMissing,

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error("intake `{intake_id}` vanished from the registry")]
    IntakeMissing { intake_id: String },
}

/// Every engine operation returns this shape: the outer `Result` carries
/// thrown errors, the inner [`Outcome`] carries the protocol answer.
pub type OpResult<T> = Result<Outcome<T>, EngineError>;

/// Unwrap an inner [`Outcome`], early-returning refusals to the caller.
macro_rules! accept {
    ($expr:expr) => {
        match $expr {
            fb_domain::Outcome::Accepted(value) => value,
            fb_domain::Outcome::Refused(envelope) => {
                return Ok(fb_domain::Outcome::Refused(envelope))
            }
        }
    };
}
pub(crate) use accept;
