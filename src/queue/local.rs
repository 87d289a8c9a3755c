//! In-process queue on a tokio broadcast channel.

use super::{Subscription, TaskQueue};
use crate::error::Result;
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Broadcast queue for a producer and a worker pool in the same process.
///
/// A subscriber that falls more than `capacity` messages behind loses the
/// oldest ones.
pub struct LocalQueue {
    channel: String,
    sender: broadcast::Sender<Arc<[u8]>>,
}

impl LocalQueue {
    pub fn new(channel: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            channel: channel.into(),
            sender,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl TaskQueue for LocalQueue {
    async fn push(&self, task_bytes: &[u8]) -> Result<()> {
        let operation = match self.sender.send(Arc::from(task_bytes)) {
            Ok(receivers) => {
                debug!(channel = %self.channel, receivers, "message published");
                "push"
            }
            Err(_) => {
                debug!(channel = %self.channel, "no subscribers, message dropped");
                "push_dropped"
            }
        };
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("channel", self.channel.clone()),
                KeyValue::new("operation", operation),
            ],
        );
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription>> {
        Ok(Box::new(LocalSubscription {
            channel: self.channel.clone(),
            receiver: self.sender.subscribe(),
        }))
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}

struct LocalSubscription {
    channel: String,
    receiver: broadcast::Receiver<Arc<[u8]>>,
}

#[async_trait]
impl Subscription for LocalSubscription {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => {
                    metrics::queue_operations().add(
                        1,
                        &[
                            KeyValue::new("channel", self.channel.clone()),
                            KeyValue::new("operation", "receive"),
                        ],
                    );
                    return Ok(Some(message.to_vec()));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, messages lost");
                    metrics::queue_operations().add(
                        skipped,
                        &[
                            KeyValue::new("channel", self.channel.clone()),
                            KeyValue::new("operation", "lagged"),
                        ],
                    );
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }
}
