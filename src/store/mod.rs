//! Task status store.
//!
//! The store owns canonical task state. Two implementations share one
//! contract: [`PgTaskStore`] persists to Postgres, [`MemoryTaskStore`] keeps
//! everything in a locked map and is substituted when Postgres is
//! unreachable and memory fallback is enabled.

pub mod memory;
pub mod postgres;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

use crate::config::StoreConfig;
use crate::db::Db;
use crate::error::Result;
use crate::model::{Task, TaskStatus};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Which implementation is serving the store contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Durable,
    Memory,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Durable => "durable",
            StoreBackend::Memory => "memory",
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRUD over tasks.
///
/// Ids are taken as strings because they arrive from outside the process;
/// an id that does not parse as a task id is reported as
/// [`Error::TaskNotFound`](crate::error::Error::TaskNotFound).
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Fails with `TaskExists` if the id is taken.
    async fn create_task(&self, task: &Task) -> Result<()>;

    /// Fetch a task by id. Fails with `TaskNotFound` if absent.
    async fn get_task(&self, id: &str) -> Result<Task>;

    /// Replace the status of an existing task, leaving the payload as is.
    /// Fails with `TaskNotFound` if absent and never creates a record.
    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<()>;

    fn backend(&self) -> StoreBackend;
}

/// The store chosen at startup, plus the live pool when it is durable.
#[derive(Clone)]
pub struct StoreHandle {
    pub store: Arc<dyn TaskStore>,
    pub db: Option<Db>,
}

impl StoreHandle {
    pub fn memory() -> Self {
        Self {
            store: Arc::new(MemoryTaskStore::new()),
            db: None,
        }
    }

    pub fn backend(&self) -> StoreBackend {
        self.store.backend()
    }
}

/// Build the store once at process start.
///
/// Connects, migrates and health-checks Postgres. If any step fails and
/// `mem_fallback` is set, an in-memory store is returned instead; otherwise
/// the error is returned and the process should not start.
pub async fn connect_store(config: &StoreConfig) -> Result<StoreHandle> {
    match connect_durable(config).await {
        Ok(db) => {
            info!(addr = %config.addr, db = %config.db_name, "using durable task store");
            Ok(StoreHandle {
                store: Arc::new(PgTaskStore::new(db.clone())),
                db: Some(db),
            })
        }
        Err(e) if config.mem_fallback => {
            warn!(
                addr = %config.addr,
                error = %e,
                "durable task store unavailable, falling back to in-memory store"
            );
            Ok(StoreHandle::memory())
        }
        Err(e) => Err(e),
    }
}

async fn connect_durable(config: &StoreConfig) -> Result<Db> {
    let db = Db::connect_with(config).await?;
    db.migrate().await?;
    db.health_check().await?;
    Ok(db)
}
