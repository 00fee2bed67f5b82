//! Message queue abstractions for the completion handoff.
//!
//! Delivery is at-least-once: a received message stays invisible for the
//! visibility timeout and reappears unless it is acknowledged. Messages
//! received more than the configured limit go to a dead-letter path.

pub mod memory;
#[cfg(feature = "sqs")]
pub mod sqs;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::CompletionMessage;

pub use memory::MemoryQueue;
#[cfg(feature = "sqs")]
pub use sqs::SqsQueue;

/// One received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle used to acknowledge this particular receipt
    pub receipt: String,
    pub message_id: String,
    /// How many times the message has been received, including this one
    pub receive_count: u32,
    /// Raw body; parsed by the consumer
    pub body: String,
}

impl Delivery {
    pub fn parse(&self) -> Result<CompletionMessage> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Send a completion message, returning the queue's message id.
    async fn enqueue(&self, message: &CompletionMessage) -> Result<String>;

    /// Take the next visible message, if any.
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// Delete a received message so it is not redelivered.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}
