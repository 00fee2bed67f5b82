//! Object store abstractions for the mirror.
//!
//! Every stored object carries two pieces of metadata used for change
//! detection on later runs:
//!
//! ```text
//! source-fingerprint   opaque token from the source's HEAD probe (may be absent)
//! content-sha256       hex SHA-256 of the stored bytes
//! ```

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
pub mod spool;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::RemoteManifestEntry;

// Re-export for convenience
pub use local::LocalStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;
pub use spool::{SpoolWriter, SpooledBody, default_spool_dir};

/// Hex SHA-256 of a byte slice.
pub fn content_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Trait for destination store backends.
///
/// Keys are independent; no operation spans more than one key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata of an existing object, or `None` when the key is absent.
    async fn exists_and_fingerprint(&self, key: &str) -> Result<Option<RemoteManifestEntry>>;

    /// Stream a spooled body to `key`, recording its hash and the source
    /// token. The body is re-read on every call, so retries are safe.
    async fn put(
        &self,
        key: &str,
        body: &SpooledBody,
        content_type: &str,
        source_fingerprint: Option<&str>,
    ) -> Result<()>;

    /// Write a small in-memory document under `key`.
    async fn put_bytes(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        source_fingerprint: Option<&str>,
    ) -> Result<()>;

    /// Read an object, returning `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Keys under `prefix`, sorted. Verification only; not on the sync path.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}
