//! Sync-side data model.

use serde::{Deserialize, Serialize};

/// Object metadata key holding the source probe token.
pub const META_SOURCE_FINGERPRINT: &str = "source-fingerprint";
/// Object metadata key holding the hex SHA-256 of the stored bytes.
pub const META_CONTENT_SHA256: &str = "content-sha256";

/// What the destination knows about a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteManifestEntry {
    pub key: String,
    /// Probe token recorded when the object was written
    pub source_fingerprint: Option<String>,
    /// Hex SHA-256 of the object bytes
    pub content_hash: Option<String>,
    pub size: Option<u64>,
}

/// Per-file result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Uploaded,
    Skipped,
    Failed,
    /// Not attempted because the run budget ran out first
    Deferred,
}

/// How the engine decided whether a file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintSource {
    /// Cheap HEAD probe (ETag or Last-Modified + Content-Length)
    Probe,
    /// Full download hashed and compared
    ContentHash,
    /// No comparison happened
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub key: String,
    pub action: SyncAction,
    pub fingerprint_source: FingerprintSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn new(key: impl Into<String>, action: SyncAction, source: FingerprintSource) -> Self {
        Self {
            key: key.into(),
            action,
            fingerprint_source: source,
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            key: key.into(),
            action: SyncAction::Failed,
            fingerprint_source: FingerprintSource::None,
            error: Some(error.to_string()),
        }
    }
}

/// Content type for a destination object, inferred from its name.
pub fn content_type_for(key: &str) -> &'static str {
    let name = key.rsplit('/').next().unwrap_or(key).to_ascii_lowercase();
    let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "json" => "application/json",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "txt" | "tsv" | "series" | "notes" | "data" => "text/plain",
        _ if name.contains(".data.") => "text/plain",
        _ => "application/octet-stream",
    }
}
