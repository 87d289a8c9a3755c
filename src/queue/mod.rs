//! Publish/subscribe channel carrying serialized tasks to the worker pool.
//!
//! Delivery is fan-out and at-most-once: every live subscription receives
//! every message published after it was created, and a message published
//! while nobody is subscribed is gone. Nothing is persisted or replayed.

pub mod local;
pub mod postgres;

pub use local::LocalQueue;
pub use postgres::PgNotifyQueue;

use crate::config::{QueueBackend, QueueConfig};
use crate::db::Db;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Buffer size of the in-process broadcast channel, per subscriber.
pub const LOCAL_QUEUE_CAPACITY: usize = 1024;

/// Publish side of the queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Publish serialized task bytes on the channel.
    ///
    /// Returns once the medium has accepted the message. Delivery to any
    /// subscriber is not awaited or guaranteed.
    async fn push(&self, task_bytes: &[u8]) -> Result<()>;

    /// Open a new subscription. Only the worker pool calls this.
    async fn subscribe(&self) -> Result<Box<dyn Subscription>>;

    fn channel(&self) -> &str;
}

/// A stream of messages from one subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message.
    ///
    /// `Ok(None)` means the medium has closed and no further messages will
    /// arrive. Transport errors are returned as `Err`; the subscription may
    /// still be usable afterwards.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Build the configured queue.
///
/// The Postgres backend needs the durable store's pool; when the store fell
/// back to memory there is no pool and construction fails.
pub fn build_queue(config: &QueueConfig, db: Option<&Db>) -> Result<Arc<dyn TaskQueue>> {
    match config.backend {
        QueueBackend::Local => Ok(Arc::new(LocalQueue::new(
            config.channel.clone(),
            LOCAL_QUEUE_CAPACITY,
        ))),
        QueueBackend::Postgres => {
            let db = db.ok_or_else(|| {
                Error::Queue(
                    "postgres queue requires a reachable database, but the store is in-memory"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(PgNotifyQueue::new(db.clone(), config.channel.clone())))
        }
    }
}
