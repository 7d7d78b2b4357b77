//! In-memory object store
//!
//! Upload backend for tests and single-process deployments. Tickets use
//! a `memory://` URL; tests stand in for the uploading client by calling
//! [`InMemoryObjectStore::put`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use fb_ports::{
    ObjectKey, ObjectStore, ObjectStoreError, UploadCheck, UploadConstraints, UploadMethod,
    UploadTicket,
};

pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    ticket_ttl_ms: u64,
}

enum StoredObject {
    Bytes(Vec<u8>),
    Failed(String),
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::with_ticket_ttl_ms(15 * 60 * 1000)
    }

    pub fn with_ticket_ttl_ms(ticket_ttl_ms: u64) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            ticket_ttl_ms,
        }
    }

    /// Simulate the client PUTting bytes to the signed URL.
    pub fn put(&self, key: &ObjectKey, bytes: Vec<u8>) {
        self.objects
            .lock()
            .expect("object store mutex poisoned")
            .insert(key.storage_key(), StoredObject::Bytes(bytes));
    }

    /// Mark an upload as failed, as a real backend would report a
    /// checksum or policy failure.
    pub fn fail(&self, key: &ObjectKey, reason: impl Into<String>) {
        self.objects
            .lock()
            .expect("object store mutex poisoned")
            .insert(key.storage_key(), StoredObject::Failed(reason.into()));
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn issue_upload_url(
        &self,
        key: &ObjectKey,
        _constraints: &UploadConstraints,
    ) -> Result<UploadTicket, ObjectStoreError> {
        Ok(UploadTicket {
            method: UploadMethod::Put,
            url: format!("memory://{}", key.storage_key()),
            headers: Vec::new(),
            expires_in_ms: self.ticket_ttl_ms,
        })
    }

    async fn verify_upload(&self, key: &ObjectKey) -> Result<UploadCheck, ObjectStoreError> {
        let objects = self.objects.lock().expect("object store mutex poisoned");
        Ok(match objects.get(&key.storage_key()) {
            None => UploadCheck::Pending,
            Some(StoredObject::Bytes(bytes)) => UploadCheck::Completed {
                size_bytes: bytes.len() as u64,
                storage_key: key.storage_key(),
            },
            Some(StoredObject::Failed(reason)) => UploadCheck::Failed {
                reason: reason.clone(),
            },
        })
    }
}
