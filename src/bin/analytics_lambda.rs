//! AWS Lambda entry point for the queue-triggered analytics consumer.
//!
//! Configure the SQS event source with `ReportBatchItemFailures` so only
//! failed records are redelivered.

use lambda_runtime::{Error as LambdaError, service_fn};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("tsmirror analytics Lambda starting...");
    lambda_runtime::run(service_fn(tsmirror::lambda::analytics_handler)).await
}
