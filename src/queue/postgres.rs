//! Queue over Postgres LISTEN/NOTIFY.
//!
//! `pg_notify` delivers to every session listening on the channel at commit
//! time and drops the notification otherwise, which is exactly fan-out with
//! at-most-once delivery. Payloads are limited by the server to just under
//! 8000 bytes; larger tasks are rejected with a database error.

use super::{Subscription, TaskQueue};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use sqlx::postgres::PgListener;

pub struct PgNotifyQueue {
    db: Db,
    channel: String,
}

impl PgNotifyQueue {
    pub fn new(db: Db, channel: impl Into<String>) -> Self {
        Self {
            db,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl TaskQueue for PgNotifyQueue {
    async fn push(&self, task_bytes: &[u8]) -> Result<()> {
        let payload = std::str::from_utf8(task_bytes).map_err(|e| {
            Error::InvalidTaskData(format!("notification payload is not UTF-8: {e}"))
        })?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(payload)
            .execute(self.db.pool())
            .await?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("channel", self.channel.clone()),
                KeyValue::new("operation", "push"),
            ],
        );
        Ok(())
    }

    /// Each subscription holds its own listener connection, separate from
    /// the pool used for `pg_notify` and store writes.
    async fn subscribe(&self) -> Result<Box<dyn Subscription>> {
        let mut listener = self
            .db
            .listener()
            .await
            .map_err(|e| Error::Queue(format!("failed to open listener: {e}")))?;
        listener
            .listen(&self.channel)
            .await
            .map_err(|e| Error::Queue(format!("failed to listen on '{}': {e}", self.channel)))?;

        Ok(Box::new(PgSubscription {
            channel: self.channel.clone(),
            listener,
        }))
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}

struct PgSubscription {
    channel: String,
    listener: PgListener,
}

#[async_trait]
impl Subscription for PgSubscription {
    /// A dropped connection surfaces once as an error; the listener
    /// reconnects and re-listens on the next call. Notifications sent while
    /// disconnected are lost.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        let notification = self
            .listener
            .recv()
            .await
            .map_err(|e| Error::Queue(format!("listener on '{}' failed: {e}", self.channel)))?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("channel", self.channel.clone()),
                KeyValue::new("operation", "receive"),
            ],
        );
        Ok(Some(notification.payload().as_bytes().to_vec()))
    }
}
