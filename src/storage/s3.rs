//! AWS S3 object store.
//!
//! Objects live at `s3://{bucket}/{key}`. Change-detection data is kept in
//! user metadata (`x-amz-meta-source-fingerprint`, `x-amz-meta-content-sha256`)
//! so a single `HeadObject` answers "is this stale?".

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::models::{META_CONTENT_SHA256, META_SOURCE_FINGERPRINT, RemoteManifestEntry};
use crate::storage::{ObjectStore, SpooledBody, content_sha256};

/// S3-backed destination store.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Create S3 storage using the default AWS credential chain.
    pub async fn from_env(bucket: impl Into<String>) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(Client::new(&config), bucket))
    }

    async fn put_stream(
        &self,
        key: &str,
        body: ByteStream,
        sha256: String,
        content_type: &str,
        source_fingerprint: Option<&str>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .metadata(META_CONTENT_SHA256, sha256);
        if let Some(fingerprint) = source_fingerprint {
            request = request.metadata(META_SOURCE_FINGERPRINT, fingerprint);
        }

        request
            .send()
            .await
            .map_err(|e| AppError::destination_write(key, e.into_service_error()))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn exists_and_fingerprint(&self, key: &str) -> Result<Option<RemoteManifestEntry>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let meta = output.metadata();
                let lookup = |name: &str| meta.and_then(|m| m.get(name)).cloned();
                Ok(Some(RemoteManifestEntry {
                    key: key.to_string(),
                    source_fingerprint: lookup(META_SOURCE_FINGERPRINT),
                    content_hash: lookup(META_CONTENT_SHA256),
                    size: output.content_length().and_then(|n| u64::try_from(n).ok()),
                }))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(AppError::storage(format!(
                        "HeadObject s3://{}/{}: {}",
                        self.bucket, key, service_err
                    )))
                }
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        body: &SpooledBody,
        content_type: &str,
        source_fingerprint: Option<&str>,
    ) -> Result<()> {
        let stream = ByteStream::from_path(body.path())
            .await
            .map_err(|e| AppError::destination_write(key, e))?;
        self.put_stream(key, stream, body.sha256().to_string(), content_type, source_fingerprint)
            .await?;

        log::debug!("Streamed {} bytes to s3://{}/{}", body.size(), self.bucket, key);
        Ok(())
    }

    async fn put_bytes(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        source_fingerprint: Option<&str>,
    ) -> Result<()> {
        let hash = content_sha256(&body);
        let size = body.len();
        self.put_stream(key, ByteStream::from(body), hash, content_type, source_fingerprint)
            .await?;

        log::debug!("Wrote {} bytes to s3://{}/{}", size, self.bucket, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output.body.collect().await.map_err(|e| {
                    AppError::storage(format!("reading s3://{}/{key}: {e}", self.bucket))
                })?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    log::info!("No object at s3://{}/{}", self.bucket, key);
                    Ok(None)
                } else {
                    Err(AppError::storage(format!(
                        "GetObject s3://{}/{}: {}",
                        self.bucket, key, service_err
                    )))
                }
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    AppError::storage(format!("ListObjectsV2: {}", e.into_service_error()))
                })?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
