//! Recursive directory crawler.
//!
//! A fixed pool of workers pulls directories from the [`Frontier`], fetches
//! and classifies each listing, offers subdirectories back to the frontier
//! and streams discovered files to the sync engine over a bounded channel.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::error::{AppError, Result};
use crate::models::{DirectoryTask, FileDescriptor, LinkKind, Location, RunCounters};
use crate::services::{ExecutionBudget, Frontier, LinkClassifier};
use crate::utils::RetryPolicy;
use crate::utils::http;
use crate::utils::url::destination_key;

/// Crawl worker pool. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RecursiveCrawler {
    client: Client,
    classifier: Arc<LinkClassifier>,
    frontier: Arc<Frontier>,
    budget: Arc<ExecutionBudget>,
    counters: Arc<RunCounters>,
    retry: RetryPolicy,
    prefix: Arc<str>,
    workers: usize,
    request_delay: Duration,
    emitted: Arc<Mutex<HashSet<Location>>>,
}

impl RecursiveCrawler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        classifier: Arc<LinkClassifier>,
        frontier: Arc<Frontier>,
        budget: Arc<ExecutionBudget>,
        counters: Arc<RunCounters>,
        retry: RetryPolicy,
        prefix: &str,
        workers: usize,
        request_delay: Duration,
    ) -> Self {
        Self {
            client,
            classifier,
            frontier,
            budget,
            counters,
            retry,
            prefix: Arc::from(prefix),
            workers: workers.max(1),
            request_delay,
            emitted: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Seed the root and run every worker until the frontier drains or the
    /// budget runs out. Returns once all workers have exited; dropping the
    /// last sender ends the sync engine's input.
    pub async fn run(&self, files: mpsc::Sender<FileDescriptor>) {
        self.frontier.seed(self.classifier.root().clone());
        log::info!(
            "Crawling {} with {} workers",
            self.classifier.root(),
            self.workers
        );

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let crawler = self.clone();
            let files = files.clone();
            workers.spawn(async move { crawler.work(id, files).await });
        }
        drop(files);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                log::error!("Crawl worker aborted: {}", e);
            }
        }
        log::info!(
            "Crawl finished: {} directories visited",
            self.frontier.visited_count()
        );
    }

    async fn work(self, id: usize, files: mpsc::Sender<FileDescriptor>) {
        loop {
            if !self.budget.has_time_remaining() {
                log::warn!("Worker {id}: run budget exhausted, stopping exploration");
                self.frontier.close();
                break;
            }
            let Some(claimed) = self.frontier.claim_next().await else {
                break;
            };
            if !self.budget.has_time_remaining() {
                self.frontier.close();
                break;
            }

            let task = claimed.task();
            match self.explore(task, &files).await {
                Ok(()) => {}
                Err(AppError::MalformedListing { url, message }) => {
                    log::warn!("Skipping malformed listing {url}: {message}");
                    RunCounters::bump(&self.counters.directory_failures);
                }
                Err(e @ AppError::Storage(_)) => {
                    log::error!("Worker {id}: {e}");
                    self.frontier.close();
                    break;
                }
                Err(e) => {
                    log::warn!("Failed to list {}: {}", task.location, e);
                    RunCounters::bump(&self.counters.directory_failures);
                }
            }
            drop(claimed);

            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }
        log::debug!("Worker {id} exiting");
    }

    /// Fetch and classify one directory. Children are offered before the
    /// caller releases the claim.
    async fn explore(
        &self,
        task: &DirectoryTask,
        files: &mpsc::Sender<FileDescriptor>,
    ) -> Result<()> {
        let location = &task.location;
        log::debug!("Listing {} (depth {})", location, task.depth);

        let body = self
            .retry
            .retry(&format!("listing {location}"), || {
                http::fetch_listing(&self.client, location)
            })
            .await?;
        let hrefs = http::extract_hrefs(location, &body)?;
        RunCounters::bump(&self.counters.directories_explored);

        let mut subdirs = 0;
        let mut found = 0;
        for href in hrefs {
            match self.classifier.classify(&href, location) {
                LinkKind::Directory(child) => {
                    if self.frontier.offer(task.child(child)) {
                        subdirs += 1;
                    }
                }
                LinkKind::File(source) => {
                    let Some(descriptor) = self.describe(source, task.depth) else {
                        continue;
                    };
                    RunCounters::bump(&self.counters.files_discovered);
                    found += 1;
                    files
                        .send(descriptor)
                        .await
                        .map_err(|_| AppError::storage("sync engine stopped accepting files"))?;
                }
                LinkKind::Ignore => {}
            }
        }

        log::debug!("{location}: {subdirs} new directories, {found} files");
        Ok(())
    }

    /// Build a descriptor the first time a file location is seen.
    fn describe(&self, source: Location, depth: u32) -> Option<FileDescriptor> {
        let key = destination_key(&self.prefix, self.classifier.root(), &source)?;
        let first = self
            .emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.clone());
        first.then(|| FileDescriptor {
            source,
            destination_key: key,
            depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve_dir, serve_file};
    use httpmock::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;

    fn crawler(
        server: &MockServer,
        workers: usize,
        max_depth: u32,
        budget: Arc<ExecutionBudget>,
    ) -> (RecursiveCrawler, Arc<RunCounters>, Arc<Frontier>) {
        let root = Location::parse(&server.url("/pub/ts/")).unwrap();
        let classifier = LinkClassifier::new(
            root,
            &["txt".to_string(), "csv".to_string(), "series".to_string()],
            &[r"^[a-z]+\.data\.\d+\.[A-Za-z]+$".to_string()],
        )
        .unwrap();
        let frontier = Frontier::new(max_depth);
        let counters = Arc::new(RunCounters::default());
        let crawler = RecursiveCrawler::new(
            Client::new(),
            Arc::new(classifier),
            Arc::clone(&frontier),
            budget,
            Arc::clone(&counters),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
            "bls-data",
            workers,
            Duration::ZERO,
        );
        (crawler, counters, frontier)
    }

    fn unlimited() -> Arc<ExecutionBudget> {
        Arc::new(ExecutionBudget::new(Duration::from_secs(600), Duration::ZERO))
    }

    async fn collect(crawler: &RecursiveCrawler) -> BTreeSet<String> {
        let (tx, mut rx) = mpsc::channel::<FileDescriptor>(4);
        let collector = tokio::spawn(async move {
            let mut keys = BTreeSet::new();
            while let Some(file) = rx.recv().await {
                assert!(keys.insert(file.destination_key), "file emitted twice");
            }
            keys
        });
        crawler.run(tx).await;
        collector.await.unwrap()
    }

    fn fixture_tree(server: &MockServer) {
        serve_dir(
            server,
            "/pub/ts/",
            &["../", "a/", "b", "pr.series", "pr.data.0.Current", "notes.pdf"],
        );
        serve_dir(server, "/pub/ts/a/", &["../", "x.txt", "deep/", "/pub/ts/b/"]);
        serve_dir(server, "/pub/ts/a/deep/", &["../", "y.csv"]);
        serve_dir(server, "/pub/ts/b/", &["../", "z.csv", "/pub/ts/a/x.txt"]);
    }

    #[tokio::test]
    async fn test_same_files_for_any_pool_size() {
        let server = MockServer::start_async().await;
        fixture_tree(&server);

        let expected: BTreeSet<String> = [
            "bls-data/pr.series",
            "bls-data/pr.data.0.Current",
            "bls-data/a/x.txt",
            "bls-data/a/deep/y.csv",
            "bls-data/b/z.csv",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        for workers in [1, 4] {
            let (crawler, counters, frontier) = crawler(&server, workers, 3, unlimited());
            let keys = collect(&crawler).await;
            assert_eq!(keys, expected, "workers = {workers}");
            assert_eq!(frontier.claimed_count(), 4);
            assert_eq!(counters.files_discovered.load(Ordering::Relaxed), 5);
        }
    }

    #[tokio::test]
    async fn test_max_depth_bounds_exploration() {
        let server = MockServer::start_async().await;
        fixture_tree(&server);

        let (crawler, counters, _) = crawler(&server, 2, 2, unlimited());
        let keys = collect(&crawler).await;

        assert!(!keys.contains("bls-data/a/deep/y.csv"));
        assert!(keys.contains("bls-data/a/x.txt"));
        assert_eq!(
            counters.directories_explored.load(Ordering::Relaxed),
            3
        );
    }

    #[tokio::test]
    async fn test_diamond_links_fetch_each_directory_once() {
        let server = MockServer::start_async().await;
        let root = serve_dir(&server, "/pub/ts/", &["a/", "b/"]);
        let a = serve_dir(&server, "/pub/ts/a/", &["../", "../c/", "../b/"]);
        let b = serve_dir(&server, "/pub/ts/b/", &["../", "../c/", "../a/"]);
        let c = serve_dir(&server, "/pub/ts/c/", &["f.txt", "../a/", "../b/"]);
        serve_file(&server, "/pub/ts/c/f.txt", "x", None);

        let (crawler, _, frontier) = crawler(&server, 4, 5, unlimited());
        let keys = collect(&crawler).await;

        assert_eq!(keys.len(), 1);
        assert_eq!(frontier.visited_count(), 4);
        for mock in [root, a, b, c] {
            assert_eq!(mock.hits(), 1);
        }
    }

    #[tokio::test]
    async fn test_failed_directory_does_not_stop_crawl() {
        let server = MockServer::start_async().await;
        serve_dir(&server, "/pub/ts/", &["bad/", "binary/", "good/"]);
        server.mock(|when, then| {
            when.method(GET).path("/pub/ts/bad/");
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(GET).path("/pub/ts/binary/");
            then.status(200)
                .header("content-type", "application/octet-stream")
                .body("\u{0}\u{1}");
        });
        serve_dir(&server, "/pub/ts/good/", &["ok.txt"]);

        let (crawler, counters, _) = crawler(&server, 2, 3, unlimited());
        let keys = collect(&crawler).await;

        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["bls-data/good/ok.txt"]);
        assert_eq!(
            counters.directory_failures.load(Ordering::Relaxed),
            2
        );
    }

    #[tokio::test]
    async fn test_exhausted_budget_explores_nothing() {
        let server = MockServer::start_async().await;
        let root = serve_dir(&server, "/pub/ts/", &["a.txt"]);

        let budget = Arc::new(ExecutionBudget::new(Duration::ZERO, Duration::ZERO));
        let (crawler, _, _) = crawler(&server, 3, 3, Arc::clone(&budget));
        let keys = collect(&crawler).await;

        assert!(keys.is_empty());
        assert!(budget.exceeded());
        assert_eq!(root.hits(), 0);
    }
}
