//! In-memory task store.
//!
//! Same contract as the durable store, no persistence across restarts.
//! The whole map sits behind one `RwLock`.

use super::{StoreBackend, TaskStore};
use crate::error::{Error, Result};
use crate::model::{Task, TaskId, TaskStatus};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone)]
pub struct MemoryTaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, task: &Task) -> Result<()> {
        let outcome = {
            let mut tasks = self.tasks.write().await;
            if tasks.contains_key(&task.id) {
                Err(Error::TaskExists(task.id.to_string()))
            } else {
                tasks.insert(task.id, task.clone());
                Ok(())
            }
        };

        metrics::record_task_created(StoreBackend::Memory.as_str(), &outcome);
        outcome
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        let key: TaskId = id.parse()?;
        self.tasks
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let key: TaskId = id.parse()?;
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&key)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        task.status = status;
        drop(tasks);

        metrics::task_status_updates().add(
            1,
            &[
                KeyValue::new("backend", "memory"),
                KeyValue::new("status", status.as_str()),
            ],
        );
        Ok(())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}
