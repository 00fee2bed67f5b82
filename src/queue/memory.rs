//! In-process queue with visibility timeout and a dead-letter list.
//!
//! Used by the CLI pipeline and tests in place of SQS.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{CompletionMessage, QueueConfig};
use crate::queue::{Delivery, MessageQueue};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    receive_count: u32,
    invisible_until: Option<Instant>,
    receipt: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
    dead_letters: Vec<StoredMessage>,
}

#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout,
            max_receive_count: max_receive_count.max(1),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.visibility_timeout(), config.max_receive_count)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Messages still on the main queue, visible or not.
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bodies moved to the dead-letter path.
    pub fn dead_letters(&self) -> Vec<String> {
        self.lock()
            .dead_letters
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn enqueue(&self, message: &CompletionMessage) -> Result<String> {
        let body = serde_json::to_string(message)?;
        let id = Uuid::new_v4().to_string();
        self.lock().messages.push_back(StoredMessage {
            id: id.clone(),
            body,
            receive_count: 0,
            invisible_until: None,
            receipt: None,
        });
        Ok(id)
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let now = Instant::now();
        let mut state = self.lock();

        let mut index = 0;
        while index < state.messages.len() {
            let visible = state.messages[index]
                .invisible_until
                .is_none_or(|until| until <= now);
            if !visible {
                index += 1;
                continue;
            }

            if state.messages[index].receive_count >= self.max_receive_count {
                if let Some(mut dead) = state.messages.remove(index) {
                    log::warn!(
                        "Message {} exceeded {} receives; moving to dead-letter queue",
                        dead.id,
                        self.max_receive_count
                    );
                    dead.receipt = None;
                    state.dead_letters.push(dead);
                }
                continue;
            }

            let message = &mut state.messages[index];
            let receipt = Uuid::new_v4().to_string();
            message.receive_count += 1;
            message.invisible_until = Some(now + self.visibility_timeout);
            message.receipt = Some(receipt.clone());
            return Ok(Some(Delivery {
                receipt,
                message_id: message.id.clone(),
                receive_count: message.receive_count,
                body: message.body.clone(),
            }));
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.lock();
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(delivery.receipt.as_str()));
        match position {
            Some(index) => {
                state.messages.remove(index);
                Ok(())
            }
            None => Err(AppError::queue(format!(
                "receipt for message {} is no longer valid",
                delivery.message_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunCounters;
    use chrono::Utc;

    fn message() -> CompletionMessage {
        CompletionMessage::new(RunCounters::default().snapshot(Uuid::new_v4(), Utc::now(), false, 5))
    }

    #[tokio::test]
    async fn test_ack_removes_message() {
        let queue = MemoryQueue::new(Duration::from_secs(30), 3);
        let sent = message();
        queue.enqueue(&sent).await.unwrap();

        let delivery = queue.receive().await.unwrap().unwrap();
        assert_eq!(delivery.receive_count, 1);
        assert_eq!(delivery.parse().unwrap(), sent);

        // Invisible while in flight.
        assert!(queue.receive().await.unwrap().is_none());

        queue.ack(&delivery).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_unacked_message_is_redelivered() {
        let queue = MemoryQueue::new(Duration::ZERO, 3);
        queue.enqueue(&message()).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.message_id, second.message_id);
        assert_eq!(second.receive_count, 2);

        // The first receipt went stale when the message was received again.
        assert!(queue.ack(&first).await.is_err());
        queue.ack(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_receives() {
        let queue = MemoryQueue::new(Duration::ZERO, 3);
        queue.enqueue(&message()).await.unwrap();

        for attempt in 1..=3 {
            let delivery = queue.receive().await.unwrap().unwrap();
            assert_eq!(delivery.receive_count, attempt);
        }

        assert!(queue.receive().await.unwrap().is_none());
        assert!(queue.is_empty());
        assert_eq!(queue.dead_letters().len(), 1);
    }
}
