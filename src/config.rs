// src/config.rs

//! Configuration loading and backend selection.
//!
//! Settings come from an optional TOML file, then environment keys, then
//! validation. The configured destination and queue decide which store and
//! queue implementations a run uses. A run that publishes always needs a
//! durable queue; the in-process queue is only wired up explicitly.

use std::path::Path;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::queue::MessageQueue;
use crate::storage::{LocalStorage, ObjectStore};

/// Load configuration from `path` (or defaults), overlay the process
/// environment and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path).map_err(|e| {
            AppError::config(format!("Failed to load config from {path:?}: {e}"))
        })?,
        None => Config::default(),
    };
    config.apply_process_env()?;
    config.validate()?;
    Ok(config)
}

/// Object store for the configured destination.
///
/// A bucket selects S3. Without one, objects go under `local_root`; callers
/// with no durable local directory pass `None` and get a config error.
pub async fn build_store(
    config: &Config,
    local_root: Option<&Path>,
) -> Result<Arc<dyn ObjectStore>> {
    match (config.destination.bucket.as_deref(), local_root) {
        #[cfg(feature = "s3")]
        (Some(bucket), _) => {
            let store = crate::storage::S3Storage::from_env(bucket).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "s3"))]
        (Some(bucket), _) => Err(AppError::config(format!(
            "bucket {bucket:?} configured but this build has no S3 support"
        ))),
        (None, Some(root)) => Ok(Arc::new(LocalStorage::new(root))),
        (None, None) => Err(AppError::config(
            "destination.bucket is unset (DEST_BUCKET); refusing to mirror into scratch space",
        )),
    }
}

/// Completion queue for the configured queue URL.
///
/// An unset URL is a config error: a completion message on an in-process
/// queue would vanish with the process while the run reports success.
pub async fn build_queue(config: &Config) -> Result<Arc<dyn MessageQueue>> {
    match config.queue.queue_url.as_deref() {
        #[cfg(feature = "sqs")]
        Some(url) => {
            let queue = crate::queue::SqsQueue::from_env(url).await?;
            Ok(Arc::new(queue))
        }
        #[cfg(not(feature = "sqs"))]
        Some(url) => Err(AppError::config(format!(
            "queue {url:?} configured but this build has no SQS support"
        ))),
        None => Err(AppError::config(
            "queue.queue_url is unset (QUEUE_URL); the completion message would be lost",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = load_config(Some(Path::new("/nonexistent/tsmirror.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[source]\nmax_depth = 2\n\n[destination]\nprefix = \"mirror\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.source.max_depth, 2);
        assert_eq!(config.destination.prefix, "mirror");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_local_store_only_when_root_given() {
        let tmp = TempDir::new().unwrap();
        let config = Config::default();

        let store = build_store(&config, Some(tmp.path())).await.unwrap();
        assert!(store.describe().starts_with("file://"));

        let err = build_store(&config, None).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_queue_url_is_rejected() {
        let config = Config::default();
        let err = build_queue(&config).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("QUEUE_URL"));
    }
}
