//! Environment-driven adapter configuration

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use fb_ports::{Storage, StorageError};

use crate::memory::InMemoryStorage;
use crate::sled_store::SledStorage;

pub const STORAGE_ENV: &str = "FORMBRIDGE_STORAGE";

/// Which storage backend to run. Parsed from `FORMBRIDGE_STORAGE`:
/// `memory` (default) or `sled:<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChoice {
    Memory,
    Sled { path: PathBuf },
}

impl StorageChoice {
    pub fn from_env() -> Self {
        match std::env::var(STORAGE_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) => StorageChoice::Memory,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.split_once(':') {
            Some(("sled", path)) if !path.is_empty() => StorageChoice::Sled {
                path: PathBuf::from(path),
            },
            _ => StorageChoice::Memory,
        }
    }

    pub fn build(&self) -> Result<Arc<dyn Storage>, StorageError> {
        match self {
            StorageChoice::Memory => {
                info!("using in-memory storage");
                Ok(Arc::new(InMemoryStorage::new()))
            }
            StorageChoice::Sled { path } => {
                info!(path = %path.display(), "using sled storage");
                Ok(Arc::new(SledStorage::open(path)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_both_backends() {
        assert_eq!(StorageChoice::parse("memory"), StorageChoice::Memory);
        assert_eq!(
            StorageChoice::parse("sled:/var/lib/formbridge"),
            StorageChoice::Sled {
                path: PathBuf::from("/var/lib/formbridge")
            }
        );
        // Unknown values fall back to the safe default.
        assert_eq!(StorageChoice::parse("postgres://x"), StorageChoice::Memory);
    }
}
