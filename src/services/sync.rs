//! Change-aware sync engine.
//!
//! For each discovered file the engine compares the source against what the
//! destination already holds and transfers only when they differ:
//!
//! 1. HEAD probe available: compare with the stored `source-fingerprint`;
//!    equal means skip without downloading.
//! 2. Probe unavailable: download, hash and compare with the stored
//!    `content-sha256`. This costs a full transfer per file and is counted in
//!    `full_fetch_comparisons`.
//!
//! Content is streamed into a spool file (hashed on the way) and uploaded
//! from there, so memory use does not grow with file size. Each transfer
//! waits `request_delay` after every request it makes to the source.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{
    FileDescriptor, FingerprintSource, RunCounters, SyncAction, SyncOutcome, content_type_for,
};
use crate::services::ExecutionBudget;
use crate::storage::{ObjectStore, SpooledBody, default_spool_dir};
use crate::utils::RetryPolicy;
use crate::utils::http;

/// Transfer pool fed by the crawler.
#[derive(Clone)]
pub struct SyncEngine {
    client: Client,
    store: Arc<dyn ObjectStore>,
    budget: Arc<ExecutionBudget>,
    counters: Arc<RunCounters>,
    retry: RetryPolicy,
    workers: usize,
    request_delay: Duration,
    spool_dir: PathBuf,
    warned_full_fetch: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(
        client: Client,
        store: Arc<dyn ObjectStore>,
        budget: Arc<ExecutionBudget>,
        counters: Arc<RunCounters>,
        retry: RetryPolicy,
        workers: usize,
    ) -> Self {
        Self {
            client,
            store,
            budget,
            counters,
            retry,
            workers: workers.max(1),
            request_delay: Duration::ZERO,
            spool_dir: default_spool_dir(),
            warned_full_fetch: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Minimum pause after each source request, per transfer slot.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }

    /// Process descriptors until every sender is dropped.
    pub async fn run(&self, files: mpsc::Receiver<FileDescriptor>) -> Vec<SyncOutcome> {
        let incoming = stream::unfold(files, |mut rx| async move {
            rx.recv().await.map(|file| (file, rx))
        });

        incoming
            .map(|file| self.sync_file(file))
            .buffer_unordered(self.workers)
            .inspect(|outcome| self.counters.record(outcome.action))
            .collect()
            .await
    }

    /// Sync one file. Never fails; errors become a `Failed` outcome.
    pub async fn sync_file(&self, file: FileDescriptor) -> SyncOutcome {
        let key = file.destination_key.clone();
        if !self.budget.has_time_remaining() {
            log::debug!("Deferring {key}: run budget exhausted");
            return SyncOutcome::new(key, SyncAction::Deferred, FingerprintSource::None);
        }

        match self.reconcile(&file).await {
            Ok(outcome) => {
                log::debug!("{:?} {}", outcome.action, outcome.key);
                outcome
            }
            Err(e) => {
                log::warn!("Sync failed for {} ({}): {}", key, file.source, e);
                SyncOutcome::failed(key, e)
            }
        }
    }

    async fn reconcile(&self, file: &FileDescriptor) -> Result<SyncOutcome> {
        let key = file.destination_key.as_str();
        let existing = self
            .retry
            .retry(&format!("head {key}"), || self.store.exists_and_fingerprint(key))
            .await?;

        let probe = self
            .retry
            .retry(&format!("probe {}", file.source), || async move {
                let result = http::probe_fingerprint(&self.client, &file.source).await;
                self.pace().await;
                result
            })
            .await
            .unwrap_or_else(|e| {
                log::debug!("Probe failed for {}: {}", file.source, e);
                None
            });

        match probe {
            Some(token) => {
                let stored = existing.as_ref().and_then(|e| e.source_fingerprint.as_deref());
                if stored == Some(token.as_str()) {
                    return Ok(SyncOutcome::new(
                        key,
                        SyncAction::Skipped,
                        FingerprintSource::Probe,
                    ));
                }
                let body = self.download(file).await?;
                self.upload(key, &body, Some(&token)).await?;
                Ok(SyncOutcome::new(
                    key,
                    SyncAction::Uploaded,
                    FingerprintSource::Probe,
                ))
            }
            None => {
                self.note_full_fetch(file);
                let body = self.download(file).await?;
                let stored = existing.as_ref().and_then(|e| e.content_hash.as_deref());
                if stored == Some(body.sha256()) {
                    return Ok(SyncOutcome::new(
                        key,
                        SyncAction::Skipped,
                        FingerprintSource::ContentHash,
                    ));
                }
                self.upload(key, &body, None).await?;
                Ok(SyncOutcome::new(
                    key,
                    SyncAction::Uploaded,
                    FingerprintSource::ContentHash,
                ))
            }
        }
    }

    /// Every attempt restarts from the source into a fresh spool file.
    async fn download(&self, file: &FileDescriptor) -> Result<SpooledBody> {
        self.retry
            .retry(&format!("fetch {}", file.source), || async move {
                let result =
                    http::download_to(&self.client, &file.source, &self.spool_dir).await;
                self.pace().await;
                result
            })
            .await
    }

    async fn upload(&self, key: &str, body: &SpooledBody, fingerprint: Option<&str>) -> Result<()> {
        let content_type = content_type_for(key);
        self.retry
            .retry(&format!("put {key}"), || {
                self.store.put(key, body, content_type, fingerprint)
            })
            .await?;
        log::info!("Uploaded {} ({} bytes)", key, body.size());
        Ok(())
    }

    async fn pace(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    fn note_full_fetch(&self, file: &FileDescriptor) {
        RunCounters::bump(&self.counters.full_fetch_comparisons);
        if !self.warned_full_fetch.swap(true, Ordering::Relaxed) {
            log::warn!(
                "Source exposes no change fingerprint for {}; falling back to full download \
                 and hash comparison (further occurrences counted in the run summary)",
                file.source
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, RunSummary};
    use crate::storage::LocalStorage;
    use crate::testing::serve_file;
    use chrono::Utc;
    use httpmock::prelude::*;
    use std::time::Instant;
    use tempfile::TempDir;

    struct Harness {
        store: Arc<LocalStorage>,
        spool: TempDir,
        workers: usize,
        request_delay: Duration,
        _tmp: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            Self {
                store: Arc::new(LocalStorage::new(tmp.path())),
                spool: TempDir::new().unwrap(),
                workers: 3,
                request_delay: Duration::ZERO,
                _tmp: tmp,
            }
        }

        async fn run(
            &self,
            server: &MockServer,
            paths: &[&str],
            budget: Duration,
        ) -> RunSummary {
            let counters = Arc::new(RunCounters::default());
            let engine = SyncEngine::new(
                Client::new(),
                self.store.clone(),
                Arc::new(ExecutionBudget::new(budget, Duration::ZERO)),
                Arc::clone(&counters),
                RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
                self.workers,
            )
            .with_request_delay(self.request_delay)
            .with_spool_dir(self.spool.path());

            let (tx, rx) = mpsc::channel(16);
            for path in paths {
                tx.send(FileDescriptor {
                    source: Location::parse(&server.url(*path)).unwrap(),
                    destination_key: format!("bls-data{path}"),
                    depth: 0,
                })
                .await
                .unwrap();
            }
            drop(tx);

            let outcomes = engine.run(rx).await;
            assert_eq!(outcomes.len(), paths.len());
            assert_eq!(
                std::fs::read_dir(self.spool.path()).map_or(0, |d| d.count()),
                0,
                "spool files left behind"
            );
            counters.snapshot(uuid::Uuid::new_v4(), Utc::now(), false, 0)
        }
    }

    const PLENTY: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let server = MockServer::start_async().await;
        let (a_get, _) = serve_file(&server, "/a.txt", "alpha", Some("\"a1\""));
        let (b_get, _) = serve_file(&server, "/b.txt", "beta", Some("\"b1\""));
        let harness = Harness::new();

        let first = harness.run(&server, &["/a.txt", "/b.txt"], PLENTY).await;
        assert_eq!((first.uploaded, first.skipped, first.failed), (2, 0, 0));

        let second = harness.run(&server, &["/a.txt", "/b.txt"], PLENTY).await;
        assert_eq!((second.uploaded, second.skipped, second.failed), (0, 2, 0));
        assert_eq!(second.full_fetch_comparisons, 0);

        // Unchanged probe means no second download.
        assert_eq!(a_get.hits(), 1);
        assert_eq!(b_get.hits(), 1);
        assert_eq!(
            harness.store.get("bls-data/a.txt").await.unwrap(),
            Some(b"alpha".to_vec())
        );
    }

    #[tokio::test]
    async fn test_changed_etag_uploads_only_that_file() {
        let server = MockServer::start_async().await;
        let (mut a_get, mut a_head) = serve_file(&server, "/a.txt", "alpha", Some("\"a1\""));
        serve_file(&server, "/b.txt", "beta", Some("\"b1\""));
        let harness = Harness::new();

        harness.run(&server, &["/a.txt", "/b.txt"], PLENTY).await;

        a_get.delete();
        a_head.delete();
        serve_file(&server, "/a.txt", "alpha v2", Some("\"a2\""));

        let second = harness.run(&server, &["/a.txt", "/b.txt"], PLENTY).await;
        assert_eq!((second.uploaded, second.skipped), (1, 1));
        assert_eq!(
            harness.store.get("bls-data/a.txt").await.unwrap(),
            Some(b"alpha v2".to_vec())
        );
        let entry = harness
            .store
            .exists_and_fingerprint("bls-data/a.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.source_fingerprint.as_deref(), Some("\"a2\""));
    }

    #[tokio::test]
    async fn test_hash_fallback_without_probe() {
        let server = MockServer::start_async().await;
        let (mut get, mut head) = serve_file(&server, "/pr.series", "series v1", None);
        let harness = Harness::new();

        let first = harness.run(&server, &["/pr.series"], PLENTY).await;
        assert_eq!(first.uploaded, 1);
        assert_eq!(first.full_fetch_comparisons, 1);

        let second = harness.run(&server, &["/pr.series"], PLENTY).await;
        assert_eq!((second.uploaded, second.skipped), (0, 1));
        assert_eq!(second.full_fetch_comparisons, 1);
        assert_eq!(get.hits(), 2);

        get.delete();
        head.delete();
        serve_file(&server, "/pr.series", "series v2", None);

        let third = harness.run(&server, &["/pr.series"], PLENTY).await;
        assert_eq!((third.uploaded, third.skipped), (1, 0));
    }

    #[tokio::test]
    async fn test_failure_is_contained() {
        let server = MockServer::start_async().await;
        serve_file(&server, "/ok.txt", "fine", Some("\"ok\""));
        server.mock(|when, then| {
            when.method(httpmock::Method::HEAD).path("/bad.txt");
            then.status(200).header("etag", "\"bad\"");
        });
        let bad = server.mock(|when, then| {
            when.method(GET).path("/bad.txt");
            then.status(502);
        });
        let harness = Harness::new();

        let summary = harness.run(&server, &["/ok.txt", "/bad.txt"], PLENTY).await;
        assert_eq!((summary.uploaded, summary.failed), (1, 1));
        assert_eq!(bad.hits(), 2);
        assert!(harness.store.get("bls-data/bad.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_budget_defers() {
        let server = MockServer::start_async().await;
        let (get, _) = serve_file(&server, "/a.txt", "alpha", Some("\"a1\""));
        let harness = Harness::new();

        let summary = harness.run(&server, &["/a.txt"], Duration::ZERO).await;
        assert_eq!(summary.deferred, 1);
        assert_eq!(summary.settled(), 0);
        assert_eq!(get.hits(), 0);
    }

    #[tokio::test]
    async fn test_source_requests_are_paced() {
        let server = MockServer::start_async().await;
        let paths = ["/a.txt", "/b.txt", "/c.txt"];
        for path in paths {
            serve_file(&server, path, "x", Some("\"v1\""));
        }
        let mut harness = Harness::new();
        harness.workers = 1;
        harness.request_delay = Duration::from_millis(100);

        // One worker, two source requests (probe + fetch) per file.
        let start = Instant::now();
        let summary = harness.run(&server, &paths, PLENTY).await;
        assert_eq!(summary.uploaded, 3);
        assert!(start.elapsed() >= Duration::from_millis(600));

        // Skips still pay for their probe.
        let start = Instant::now();
        let summary = harness.run(&server, &paths, PLENTY).await;
        assert_eq!(summary.skipped, 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
