// src/models/mod.rs

//! Domain models for the mirror.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod analytics;
mod config;
mod crawl;
mod run;
mod sync;

// Re-export all public types
pub use analytics::{
    AnalyticsReport, BestYear, JoinedRow, MomentStats, PopulationRecord, SeriesRecord,
};
pub use config::{
    AnalyticsConfig, BudgetConfig, Config, DestinationConfig, LoggingConfig, PopulationConfig,
    QueueConfig, RetryConfig, SourceConfig, SyncConfig,
};
pub use crawl::{DirectoryTask, FileDescriptor, LinkKind, Location};
pub use run::{CompletionMessage, RunCounters, RunSummary};
pub use sync::{
    FingerprintSource, META_CONTENT_SHA256, META_SOURCE_FINGERPRINT, RemoteManifestEntry,
    SyncAction, SyncOutcome, content_type_for,
};
