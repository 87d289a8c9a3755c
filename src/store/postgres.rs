//! Durable task store over the shared Postgres pool.

use super::{StoreBackend, TaskStore};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{Task, TaskId, TaskStatus};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use uuid::Uuid;

pub struct PgTaskStore {
    db: Db,
}

impl PgTaskStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create_task(&self, task: &Task) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO tasks (id, payload, status) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(task.id.0)
        .bind(&task.payload)
        .bind(task.status.as_str())
        .execute(self.db.pool())
        .await;

        let outcome = match result {
            Ok(done) if done.rows_affected() == 0 => Err(Error::TaskExists(task.id.to_string())),
            Ok(_) => Ok(()),
            Err(e) => Err(Error::from(e)),
        };

        metrics::record_task_created(StoreBackend::Durable.as_str(), &outcome);
        outcome
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        let key: TaskId = id.parse()?;
        let row: Option<TaskRow> =
            sqlx::query_as("SELECT id, payload, status FROM tasks WHERE id = $1")
                .bind(key.0)
                .fetch_optional(self.db.pool())
                .await?;

        row.ok_or_else(|| Error::TaskNotFound(id.to_string()))?
            .try_into_task()
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let key: TaskId = id.parse()?;
        let rows_affected =
            sqlx::query("UPDATE tasks SET status = $1, updated_at = now() WHERE id = $2")
                .bind(status.as_str())
                .bind(key.0)
                .execute(self.db.pool())
                .await?
                .rows_affected();

        if rows_affected == 0 {
            return Err(Error::TaskNotFound(id.to_string()));
        }

        metrics::task_status_updates().add(
            1,
            &[
                KeyValue::new("backend", "durable"),
                KeyValue::new("status", status.as_str()),
            ],
        );
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Durable
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    payload: String,
    status: String,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            payload: self.payload,
            status: self.status.parse()?,
        })
    }
}
