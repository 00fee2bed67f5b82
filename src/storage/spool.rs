//! Disk-backed transfer bodies.
//!
//! Source content is written chunk by chunk to a scratch file while its
//! SHA-256 is computed, so a transfer holds at most one chunk in memory. The
//! finished [`SpooledBody`] is what stores upload from; a failed upload is
//! retried by re-reading the file. The file is removed when the body drops.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// Scratch directory used when none is configured.
pub fn default_spool_dir() -> PathBuf {
    std::env::temp_dir().join("tsmirror-spool")
}

/// Finished transfer body on local disk.
#[derive(Debug)]
pub struct SpooledBody {
    path: PathBuf,
    sha256: String,
    size: u64,
}

impl SpooledBody {
    /// Spool an in-memory buffer. Used for small documents and tests.
    pub async fn from_bytes(dir: &Path, bytes: &[u8]) -> Result<Self> {
        let mut writer = SpoolWriter::create(dir).await?;
        writer.write(bytes).await?;
        writer.finish().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hex SHA-256 of the spooled bytes.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for SpooledBody {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("Could not remove spool file {}: {}", self.path.display(), e);
        }
    }
}

/// Incremental writer for a [`SpooledBody`].
///
/// Dropping an unfinished writer removes its partial file.
pub struct SpoolWriter {
    file: tokio::fs::File,
    hasher: Sha256,
    body: SpooledBody,
}

impl SpoolWriter {
    pub async fn create(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.part", uuid::Uuid::new_v4()));
        let file = tokio::fs::File::create(&path).await?;
        Ok(Self {
            file,
            hasher: Sha256::new(),
            body: SpooledBody {
                path,
                sha256: String::new(),
                size: 0,
            },
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.body.size += chunk.len() as u64;
        Ok(())
    }

    pub async fn finish(self) -> Result<SpooledBody> {
        let Self {
            mut file,
            hasher,
            mut body,
        } = self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        body.sha256 = hex::encode(hasher.finalize());
        Ok(body)
    }
}
