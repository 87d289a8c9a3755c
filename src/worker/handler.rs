//! Task bodies executed by pool workers.

use crate::error::Result;
use crate::model::Task;
use async_trait::async_trait;
use std::time::Duration;

/// The work a pool worker performs for each received task.
///
/// `Ok` marks the task `done`, `Err` marks it `failed`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<()>;
}

/// Placeholder body: sleeps for a fixed delay and succeeds.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedWork {
    pub delay: Duration,
}

impl SimulatedWork {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl TaskHandler for SimulatedWork {
    async fn execute(&self, _task: &Task) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
