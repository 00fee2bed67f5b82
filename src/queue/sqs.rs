//! AWS SQS queue.
//!
//! Redelivery and the dead-letter redrive are configured on the queue
//! itself; this type only sends, receives and deletes.

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::types::MessageSystemAttributeName;

use crate::error::{AppError, Result};
use crate::models::CompletionMessage;
use crate::queue::{Delivery, MessageQueue};

/// Long-poll window for `receive`, in seconds.
const RECEIVE_WAIT_SECS: i32 = 20;

#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Create a queue client using the default AWS credential chain.
    pub async fn from_env(queue_url: impl Into<String>) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(Client::new(&config), queue_url))
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn enqueue(&self, message: &CompletionMessage) -> Result<String> {
        let body = serde_json::to_string(message)?;
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| AppError::queue(format!("SendMessage: {}", e.into_service_error())))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(RECEIVE_WAIT_SECS)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| AppError::queue(format!("ReceiveMessage: {}", e.into_service_error())))?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };
        let Some(receipt) = message.receipt_handle() else {
            return Err(AppError::queue("received message without a receipt handle"));
        };

        let receive_count = message
            .attributes()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
            .and_then(|count| count.parse().ok())
            .unwrap_or(1);

        Ok(Some(Delivery {
            receipt: receipt.to_string(),
            message_id: message.message_id().unwrap_or_default().to_string(),
            receive_count,
            body: message.body().unwrap_or_default().to_string(),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&delivery.receipt)
            .send()
            .await
            .map_err(|e| AppError::queue(format!("DeleteMessage: {}", e.into_service_error())))?;
        Ok(())
    }
}
