//! Pipeline entry points.
//!
//! - `run_sync`: crawl the source, mirror changed files, publish completion
//! - `run_analytics`: compute the analyses over the mirrored datasets
//! - `AnalyticsConsumer`: queue-driven wrapper around `run_analytics`

pub mod analytics;
pub mod sync;

pub use analytics::{AnalyticsConsumer, ConsumerState, run_analytics};
pub use sync::{RunReport, run_sync};
