//! Local filesystem object store.
//!
//! Used for development, the CLI and tests. Production runs use S3Storage.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── bls-data/
//! │   ├── pr.series              # object bytes, key = relative path
//! │   └── pr.data.0.Current
//! └── .meta/
//!     └── bls-data/
//!         └── pr.series.json     # content type, hash, source fingerprint
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::RemoteManifestEntry;
use crate::storage::{ObjectStore, SpooledBody, content_sha256};

const META_DIR: &str = ".meta";

/// Sidecar metadata stored next to each object.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
    #[serde(default)]
    source_fingerprint: Option<String>,
    content_hash: String,
    size: u64,
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a key, rejecting keys that escape the root.
    fn path(&self, key: &str) -> Result<PathBuf> {
        let clean = key.trim_start_matches('/');
        if clean.is_empty()
            || clean
                .split('/')
                .any(|segment| segment == ".." || segment == "." || segment == META_DIR)
        {
            return Err(AppError::validation(format!("invalid object key {key:?}")));
        }
        Ok(self.root_dir.join(clean))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf> {
        self.path(key)?;
        Ok(self
            .root_dir
            .join(META_DIR)
            .join(format!("{}.json", key.trim_start_matches('/'))))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.ensure_dir(path).await?;

        let tmp = Self::temp_path(path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Copy `source` into place atomically without loading it into memory.
    async fn write_file(&self, path: &Path, source: &Path) -> Result<()> {
        self.ensure_dir(path).await?;

        let tmp = Self::temp_path(path);
        let mut reader = tokio::fs::File::open(source).await?;
        let mut file = tokio::fs::File::create(&tmp).await?;
        tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn remove_if_present(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn write_meta(&self, key: &str, meta_path: &Path, meta: &ObjectMeta) -> Result<()> {
        self.write_bytes(meta_path, &serde_json::to_vec_pretty(meta)?)
            .await
            .map_err(|e| AppError::destination_write(key, e))
    }

    async fn collect_keys(&self, dir: PathBuf, out: &mut Vec<String>) -> Result<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().await?.is_dir() {
                    if !(dir == self.root_dir && name == META_DIR) {
                        pending.push(path);
                    }
                } else if !name.ends_with(".tmp") {
                    if let Ok(relative) = path.strip_prefix(&self.root_dir) {
                        let key = relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/");
                        out.push(key);
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn exists_and_fingerprint(&self, key: &str) -> Result<Option<RemoteManifestEntry>> {
        let path = self.path(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }

        let meta: Option<ObjectMeta> = match Self::read_bytes(&self.meta_path(key)?).await? {
            Some(bytes) => serde_json::from_slice(&bytes).ok(),
            None => None,
        };
        Ok(Some(match meta {
            Some(meta) => RemoteManifestEntry {
                key: key.to_string(),
                source_fingerprint: meta.source_fingerprint,
                content_hash: Some(meta.content_hash),
                size: Some(meta.size),
            },
            None => RemoteManifestEntry {
                key: key.to_string(),
                ..RemoteManifestEntry::default()
            },
        }))
    }

    async fn put(
        &self,
        key: &str,
        body: &SpooledBody,
        content_type: &str,
        source_fingerprint: Option<&str>,
    ) -> Result<()> {
        let path = self.path(key)?;
        let meta_path = self.meta_path(key)?;
        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            source_fingerprint: source_fingerprint.map(str::to_string),
            content_hash: body.sha256().to_string(),
            size: body.size(),
        };

        // Stale metadata must never describe new bytes.
        Self::remove_if_present(&meta_path).await?;
        self.write_file(&path, body.path())
            .await
            .map_err(|e| AppError::destination_write(key, e))?;
        self.write_meta(key, &meta_path, &meta).await
    }

    async fn put_bytes(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        source_fingerprint: Option<&str>,
    ) -> Result<()> {
        let path = self.path(key)?;
        let meta_path = self.meta_path(key)?;
        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            source_fingerprint: source_fingerprint.map(str::to_string),
            content_hash: content_sha256(&body),
            size: body.len() as u64,
        };

        Self::remove_if_present(&meta_path).await?;
        self.write_bytes(&path, &body)
            .await
            .map_err(|e| AppError::destination_write(key, e))?;
        self.write_meta(key, &meta_path, &meta).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Self::read_bytes(&self.path(key)?).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(self.root_dir.clone(), &mut keys).await?;
        let prefix = prefix.trim_start_matches('/');
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root_dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_get() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage
            .put_bytes("bls-data/pr.series", b"hello".to_vec(), "text/plain", Some("\"e1\""))
            .await
            .unwrap();

        let data = storage.get("bls-data/pr.series").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));

        let entry = storage
            .exists_and_fingerprint("bls-data/pr.series")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.source_fingerprint.as_deref(), Some("\"e1\""));
        assert_eq!(entry.content_hash, Some(content_sha256(b"hello")));
        assert_eq!(entry.size, Some(5));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.get("nope.txt").await.unwrap().is_none());
        assert!(
            storage
                .exists_and_fingerprint("nope.txt")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_overwrite_replaces_metadata() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage
            .put_bytes("k.txt", b"one".to_vec(), "text/plain", Some("v1"))
            .await
            .unwrap();
        storage.put_bytes("k.txt", b"two".to_vec(), "text/plain", None).await.unwrap();

        let entry = storage.exists_and_fingerprint("k.txt").await.unwrap().unwrap();
        assert_eq!(entry.source_fingerprint, None);
        assert_eq!(entry.content_hash, Some(content_sha256(b"two")));
    }

    #[tokio::test]
    async fn test_list_skips_metadata() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        for key in ["bls-data/b.txt", "bls-data/a/x.csv", "population-data/p.json"] {
            storage.put_bytes(key, b"x".to_vec(), "text/plain", None).await.unwrap();
        }

        let keys = storage.list("bls-data/").await.unwrap();
        assert_eq!(keys, vec!["bls-data/a/x.csv", "bls-data/b.txt"]);
        assert_eq!(storage.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let err = storage
            .put_bytes("../evil.txt", Vec::new(), "text/plain", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_put_streams_spooled_body() {
        let tmp = TempDir::new().unwrap();
        let spool = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let body = SpooledBody::from_bytes(spool.path(), b"year\tvalue\n")
            .await
            .unwrap();

        // A retried put re-reads the same spool file.
        for _ in 0..2 {
            storage
                .put("bls-data/pr.series", &body, "text/plain", Some("\"e1\""))
                .await
                .unwrap();
        }

        assert_eq!(
            storage.get("bls-data/pr.series").await.unwrap(),
            Some(b"year\tvalue\n".to_vec())
        );
        let entry = storage
            .exists_and_fingerprint("bls-data/pr.series")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.content_hash, Some(content_sha256(b"year\tvalue\n")));
        assert_eq!(entry.size, Some(11));
        assert!(body.path().exists());
    }
}
