// src/lambda/mod.rs

//! AWS Lambda handlers.
//!
//! Two functions are deployed:
//! 1. The scheduled sync function runs one mirror pass and publishes the
//!    completion message.
//! 2. The analytics function is triggered by the completion queue and
//!    reports per-record failures so only those are redelivered.
//!
//! Payload types build without the `lambda` feature so batch handling is
//! testable on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{AnalyticsConsumer, RunReport};
use crate::queue::Delivery;

/// Sync function response.
#[derive(Debug, Default, Serialize)]
pub struct SyncResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,

    pub files_discovered: u64,
    pub uploaded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub deferred: u64,
    pub budget_exceeded: bool,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub execution_time_ms: u64,
}

impl SyncResponse {
    pub fn from_report(report: &RunReport, elapsed: Duration) -> Self {
        let summary = &report.summary;
        Self {
            success: report.is_success(),
            run_id: Some(summary.run_id),
            files_discovered: summary.files_discovered,
            uploaded: summary.uploaded,
            skipped: summary.skipped,
            failed: summary.failed,
            deferred: summary.deferred,
            budget_exceeded: summary.budget_exceeded,
            error: report.publish_error.clone(),
            execution_time_ms: elapsed.as_millis() as u64,
        }
    }
}

/// SQS trigger payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsRecord {
    pub message_id: String,
    #[serde(default)]
    pub receipt_handle: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attributes: SqsRecordAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqsRecordAttributes {
    #[serde(rename = "ApproximateReceiveCount")]
    pub approximate_receive_count: Option<String>,
}

impl SqsRecord {
    pub fn to_delivery(&self) -> Delivery {
        Delivery {
            receipt: self.receipt_handle.clone(),
            message_id: self.message_id.clone(),
            receive_count: self
                .attributes
                .approximate_receive_count
                .as_deref()
                .and_then(|c| c.parse().ok())
                .unwrap_or(1),
            body: self.body.clone(),
        }
    }
}

/// Partial batch response: listed records are retried by SQS.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SqsBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Process every record, collecting the ids of those that failed.
pub async fn process_batch(consumer: &AnalyticsConsumer, event: &SqsEvent) -> SqsBatchResponse {
    let mut response = SqsBatchResponse::default();
    for record in &event.records {
        let delivery = record.to_delivery();
        if let Err(e) = consumer.handle(&delivery).await {
            log::error!(
                "Record {} failed (receive {}): {}",
                delivery.message_id,
                delivery.receive_count,
                e
            );
            response.batch_item_failures.push(BatchItemFailure {
                item_identifier: record.message_id.clone(),
            });
        }
    }
    response
}

#[cfg(feature = "lambda")]
pub use handlers::{analytics_handler, sync_handler};

#[cfg(feature = "lambda")]
mod handlers {
    use std::time::Instant;

    use lambda_runtime::{Error as LambdaError, LambdaEvent};
    use serde_json::Value;
    use tracing::{error, info, instrument};

    use super::{SqsBatchResponse, SqsEvent, SyncResponse, process_batch};
    use crate::config::{build_queue, build_store, load_config};
    use crate::pipeline::{AnalyticsConsumer, run_sync};

    /// Scheduled sync handler. A failed handoff is an error to the host.
    ///
    /// Both `DEST_BUCKET` and `QUEUE_URL` are required; the function's local
    /// disk does not outlive the invocation.
    #[instrument(skip(event))]
    pub async fn sync_handler(
        event: LambdaEvent<Value>,
    ) -> std::result::Result<SyncResponse, LambdaError> {
        let start = Instant::now();
        let (payload, context) = event.into_parts();
        info!(
            "Starting sync: request_id={}, trigger={}",
            context.request_id, payload
        );

        let config = load_config(None)?;
        let store = build_store(&config, None).await?;
        let queue = build_queue(&config).await?;

        let report = run_sync(&config, store, queue).await?;
        let response = SyncResponse::from_report(&report, start.elapsed());
        if let Some(message) = &report.publish_error {
            error!("Completion publish failed: {}", message);
            return Err(format!("run {} not handed off: {message}", report.summary.run_id).into());
        }

        info!(
            "Sync completed: {} uploaded, {} skipped, {} failed in {}ms",
            response.uploaded, response.skipped, response.failed, response.execution_time_ms
        );
        Ok(response)
    }

    /// Queue-triggered analytics handler.
    #[instrument(skip(event))]
    pub async fn analytics_handler(
        event: LambdaEvent<SqsEvent>,
    ) -> std::result::Result<SqsBatchResponse, LambdaError> {
        let (payload, _context) = event.into_parts();
        info!("Received {} records", payload.records.len());

        let config = load_config(None)?;
        let store = build_store(&config, None).await?;
        let queue = build_queue(&config).await?;
        let consumer = AnalyticsConsumer::new(store, queue, config.analytics);

        let response = process_batch(&consumer, &payload).await;
        info!(
            "Batch done: {} of {} records failed",
            response.batch_item_failures.len(),
            payload.records.len()
        );
        Ok(response)
    }
}
