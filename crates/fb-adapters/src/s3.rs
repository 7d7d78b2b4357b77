//! S3/MinIO object store adapter
//!
//! Implements upload negotiation with presigned PUT URLs. Keys are
//! `{intakeId}/{submissionId}/{fieldPath}/{uploadId}`, so one submission's
//! uploads share a prefix and can be swept by retention policy.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client as S3Client,
};
use tracing::{debug, info, instrument, warn};

use fb_ports::{
    ObjectKey, ObjectStore, ObjectStoreError, UploadCheck, UploadConstraints, UploadMethod,
    UploadTicket,
};

/// Configuration for the S3/MinIO upload store.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint URL (e.g. "http://localhost:9000" for MinIO).
    pub endpoint: String,
    /// Region (any value works for MinIO).
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Path-style addressing, required for MinIO.
    pub force_path_style: bool,
    /// How long issued upload URLs stay valid.
    pub ticket_ttl_ms: u64,
}

impl S3Config {
    pub fn local_dev() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            bucket: "formbridge-uploads".to_string(),
            force_path_style: true,
            ticket_ttl_ms: 15 * 60 * 1000,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::local_dev();
        Self {
            endpoint: std::env::var("FORMBRIDGE_S3_ENDPOINT").unwrap_or(defaults.endpoint),
            region: std::env::var("FORMBRIDGE_S3_REGION").unwrap_or(defaults.region),
            access_key_id: std::env::var("FORMBRIDGE_S3_ACCESS_KEY")
                .unwrap_or(defaults.access_key_id),
            secret_access_key: std::env::var("FORMBRIDGE_S3_SECRET_KEY")
                .unwrap_or(defaults.secret_access_key),
            bucket: std::env::var("FORMBRIDGE_S3_BUCKET").unwrap_or(defaults.bucket),
            force_path_style: true,
            ticket_ttl_ms: defaults.ticket_ttl_ms,
        }
    }
}

/// Presigned-URL upload store backed by S3-compatible storage.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    ticket_ttl_ms: u64,
}

impl S3ObjectStore {
    pub async fn new(config: S3Config) -> Result<Self, ObjectStoreError> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "formbridge-upload-store",
        );

        let s3_config = S3ConfigBuilder::new()
            .endpoint_url(&config.endpoint)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style)
            .behavior_version(BehaviorVersion::latest())
            .build();

        let store = Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket,
            ticket_ttl_ms: config.ticket_ttl_ms,
        };

        store.ensure_bucket().await?;

        info!(bucket = %store.bucket, "S3 upload store initialized");
        Ok(store)
    }

    async fn ensure_bucket(&self) -> Result<(), ObjectStoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!(bucket = %self.bucket, "upload bucket exists");
                Ok(())
            }
            Err(e) => {
                warn!(bucket = %self.bucket, error = ?e, "bucket not found, creating");
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(|e| ObjectStoreError::Backend {
                        message: format!("failed to create bucket: {e}"),
                    })?;
                info!(bucket = %self.bucket, "created upload bucket");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, constraints), fields(bucket = %self.bucket))]
    async fn issue_upload_url(
        &self,
        key: &ObjectKey,
        constraints: &UploadConstraints,
    ) -> Result<UploadTicket, ObjectStoreError> {
        let presigning = PresigningConfig::expires_in(Duration::from_millis(self.ticket_ttl_ms))
            .map_err(|e| ObjectStoreError::Backend {
                message: format!("invalid presigning window: {e}"),
            })?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key.storage_key())
            .content_type(&constraints.mime_type)
            .content_length(constraints.size_bytes as i64)
            .presigned(presigning)
            .await
            .map_err(|e| ObjectStoreError::Backend {
                message: format!("failed to presign upload: {e}"),
            })?;

        debug!(key = %key.storage_key(), "issued presigned upload URL");

        Ok(UploadTicket {
            method: UploadMethod::Put,
            url: presigned.uri().to_string(),
            headers: presigned
                .headers()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            expires_in_ms: self.ticket_ttl_ms,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn verify_upload(&self, key: &ObjectKey) -> Result<UploadCheck, ObjectStoreError> {
        let storage_key = key.storage_key();
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&storage_key)
            .send()
            .await
        {
            Ok(head) => {
                let size_bytes = head.content_length().unwrap_or(0).max(0) as u64;
                debug!(key = %storage_key, size = size_bytes, "upload verified");
                Ok(UploadCheck::Completed {
                    size_bytes,
                    storage_key,
                })
            }
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    // Nothing landed yet; the engine decides whether the
                    // ticket has lapsed.
                    Ok(UploadCheck::Pending)
                } else {
                    Err(ObjectStoreError::Backend {
                        message: format!("failed to verify upload: {service_err:?}"),
                    })
                }
            }
        }
    }
}
