// src/pipeline/sync.rs

//! One mirror run: crawl, sync, population fetch, publish.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CompletionMessage, Config, RunCounters, RunSummary, SyncAction, SyncOutcome};
use crate::queue::MessageQueue;
use crate::services::{
    CompletionPublisher, ExecutionBudget, Frontier, LinkClassifier, PopulationFetcher,
    RecursiveCrawler, SyncEngine,
};
use crate::storage::ObjectStore;
use crate::utils::{self, RetryPolicy, http};

/// Result of a run. Data may be fully synced while the handoff failed.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub message: Option<CompletionMessage>,
    pub publish_error: Option<String>,
    /// Files whose transfer failed after retries
    pub failures: Vec<SyncOutcome>,
}

impl RunReport {
    /// True once the completion message is on the queue.
    pub fn is_success(&self) -> bool {
        self.message.is_some()
    }
}

/// Run the mirror once against `store`, publishing to `queue`.
///
/// Per-file and per-directory failures are counted, not returned. Only setup
/// errors (bad root URL, client construction) fail the call; a publish
/// failure is reported through [`RunReport::publish_error`].
pub async fn run_sync(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn MessageQueue>,
) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let budget = Arc::new(ExecutionBudget::new(
        config.budget.ceiling(),
        config.budget.safety_margin(),
    ));
    utils::log::header(&format!("Mirror run {run_id}"));
    log::info!(
        "Source {} -> {} (budget {}s, margin {}s)",
        config.source.root_url,
        store.describe(),
        config.budget.ceiling_secs,
        config.budget.safety_margin_secs
    );

    let client = http::create_async_client(&config.source)?;
    let classifier = Arc::new(LinkClassifier::from_config(&config.source)?);
    let counters = Arc::new(RunCounters::default());
    let retry = RetryPolicy::from_config(&config.retry).bounded_by(Arc::clone(&budget));

    let crawler = RecursiveCrawler::new(
        client.clone(),
        classifier,
        Frontier::new(config.source.max_depth),
        Arc::clone(&budget),
        Arc::clone(&counters),
        retry.clone(),
        &config.destination.prefix,
        config.source.workers,
        config.source.request_delay(),
    );
    let engine = SyncEngine::new(
        client.clone(),
        Arc::clone(&store),
        Arc::clone(&budget),
        Arc::clone(&counters),
        retry.clone(),
        config.sync.workers,
    )
    .with_request_delay(config.source.request_delay())
    .with_spool_dir(config.sync.spool_dir());

    utils::log::step(1, 3, "Crawl and sync");
    let (tx, rx) = mpsc::channel(config.sync.channel_capacity.max(1));
    let ((), outcomes) = tokio::join!(crawler.run(tx), engine.run(rx));

    let failures: Vec<SyncOutcome> = outcomes
        .into_iter()
        .filter(|o| o.action == SyncAction::Failed)
        .collect();
    for failure in &failures {
        utils::log::sub_item(&format!(
            "failed {}: {}",
            failure.key,
            failure.error.as_deref().unwrap_or("unknown error")
        ));
    }

    utils::log::step(2, 3, "Population dataset");
    let population = PopulationFetcher::new(
        client,
        Arc::clone(&store),
        retry,
        config.population.clone(),
    );
    if !population.is_enabled() {
        log::info!("Population fetch disabled");
    } else if !budget.has_time_remaining() {
        log::warn!("Skipping population fetch: run budget exhausted");
    } else {
        match population.fetch_and_store().await {
            Ok(Some(_)) => counters.population_updated.store(true, Ordering::Relaxed),
            Ok(None) => {}
            Err(e) => log::warn!("Population fetch failed: {e}"),
        }
    }

    let summary = counters.snapshot(
        run_id,
        started_at,
        budget.exceeded(),
        budget.elapsed().as_millis() as u64,
    );
    utils::log::run_summary(&summary);

    utils::log::step(3, 3, "Publish completion");
    let publisher = CompletionPublisher::new(queue, RetryPolicy::from_config(&config.retry));
    let report = match publisher.publish(summary.clone()).await {
        Ok(message) => RunReport {
            summary,
            message: Some(message),
            publish_error: None,
            failures,
        },
        Err(e) => {
            log::error!("Run {run_id} synced data but could not publish completion: {e}");
            RunReport {
                summary,
                message: None,
                publish_error: Some(e.to_string()),
                failures,
            }
        }
    };
    Ok(report)
}
