//! Run accounting and the completion message handed to analytics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SyncAction;

/// Live counters shared by crawl and sync workers.
#[derive(Debug, Default)]
pub struct RunCounters {
    pub files_discovered: AtomicU64,
    pub directories_explored: AtomicU64,
    pub directory_failures: AtomicU64,
    pub uploaded: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
    pub deferred: AtomicU64,
    pub full_fetch_comparisons: AtomicU64,
    pub population_updated: AtomicBool,
}

impl RunCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, action: SyncAction) {
        let counter = match action {
            SyncAction::Uploaded => &self.uploaded,
            SyncAction::Skipped => &self.skipped,
            SyncAction::Failed => &self.failed,
            SyncAction::Deferred => &self.deferred,
        };
        Self::bump(counter);
    }

    /// Freeze the counters into a summary.
    pub fn snapshot(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        budget_exceeded: bool,
        elapsed_ms: u64,
    ) -> RunSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunSummary {
            run_id,
            started_at,
            files_discovered: load(&self.files_discovered),
            directories_explored: load(&self.directories_explored),
            directory_failures: load(&self.directory_failures),
            uploaded: load(&self.uploaded),
            skipped: load(&self.skipped),
            failed: load(&self.failed),
            deferred: load(&self.deferred),
            full_fetch_comparisons: load(&self.full_fetch_comparisons),
            population_updated: self.population_updated.load(Ordering::Relaxed),
            budget_exceeded,
            elapsed_ms,
        }
    }
}

/// Counts for one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub files_discovered: u64,
    pub directories_explored: u64,
    #[serde(default)]
    pub directory_failures: u64,
    pub uploaded: u64,
    pub skipped: u64,
    pub failed: u64,
    #[serde(default)]
    pub deferred: u64,
    #[serde(default)]
    pub full_fetch_comparisons: u64,
    #[serde(default)]
    pub population_updated: bool,
    pub budget_exceeded: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Files that reached a terminal sync outcome.
    pub fn settled(&self) -> u64 {
        self.uploaded + self.skipped + self.failed
    }
}

/// Body of the message published once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_trigger")]
    pub trigger: String,
    pub summary: RunSummary,
}

fn default_trigger() -> String {
    "data_sync_complete".into()
}

impl CompletionMessage {
    pub fn new(summary: RunSummary) -> Self {
        Self {
            run_id: summary.run_id,
            timestamp: Utc::now(),
            trigger: default_trigger(),
            summary,
        }
    }
}
