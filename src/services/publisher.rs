//! Completion message publisher.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{CompletionMessage, RunSummary};
use crate::queue::MessageQueue;
use crate::utils::RetryPolicy;

/// Sends exactly one completion message per run, retrying transient failures.
#[derive(Clone)]
pub struct CompletionPublisher {
    queue: Arc<dyn MessageQueue>,
    retry: RetryPolicy,
}

impl CompletionPublisher {
    pub fn new(queue: Arc<dyn MessageQueue>, retry: RetryPolicy) -> Self {
        Self { queue, retry }
    }

    /// Publish the summary. Exhausted retries surface as `AppError::Publish`.
    pub async fn publish(&self, summary: RunSummary) -> Result<CompletionMessage> {
        let message = CompletionMessage::new(summary);
        let message_id = self
            .retry
            .retry("publish completion", || self.queue.enqueue(&message))
            .await
            .map_err(|e| AppError::Publish {
                attempts: self.retry.max_attempts(),
                message: e.to_string(),
            })?;

        log::info!(
            "Published completion for run {} (message id {})",
            message.run_id,
            message_id
        );
        Ok(message)
    }
}
