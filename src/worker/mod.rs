//! Worker pool: subscribes to the queue, runs task bodies, writes results
//! back to the store.
//!
//! In [`DeliveryMode::Broadcast`] every worker owns a subscription, so each
//! published task is executed once per worker. In [`DeliveryMode::Shared`]
//! the pool owns a single subscription that all workers drain from, so each
//! task is executed by exactly one of them. Neither mode leases, acks or
//! redelivers: a worker that dies mid-task leaves the task `pending`.

pub mod handler;

pub use handler::{SimulatedWork, TaskHandler};

use crate::error::{Error, Result};
use crate::model::{Task, TaskStatus};
use crate::queue::{Subscription, TaskQueue};
use crate::store::TaskStore;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_status_change, start_task_span};
use opentelemetry::KeyValue;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};

/// How published tasks are distributed across the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// One subscription per worker. Every worker sees every task.
    #[default]
    Broadcast,
    /// One subscription for the whole pool. Workers compete for tasks.
    Shared,
}

impl FromStr for DeliveryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "broadcast" => Ok(DeliveryMode::Broadcast),
            "shared" => Ok(DeliveryMode::Shared),
            other => Err(Error::Config(format!(
                "DELIVERY_MODE must be 'broadcast' or 'shared', got '{other}'"
            ))),
        }
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers.
    pub size: usize,
    pub delivery: DeliveryMode,
    /// Write `processing` before running the task body.
    pub mark_processing: bool,
    /// Pause after a transport error before receiving again.
    pub retry_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 10,
            delivery: DeliveryMode::Broadcast,
            mark_processing: false,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// A fixed-size set of workers bound to one store, queue and handler.
pub struct WorkerPool {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        config: PoolConfig,
    ) -> Self {
        Self {
            store,
            queue,
            handler,
            config,
        }
    }

    /// Subscribe and spawn the workers.
    ///
    /// All subscriptions exist by the time this returns, so any task pushed
    /// afterwards reaches the pool.
    pub async fn start(self) -> Result<PoolHandle> {
        if self.config.size == 0 {
            return Err(Error::Config("worker pool size must be at least 1".to_string()));
        }

        let mut intakes = Vec::with_capacity(self.config.size);
        match self.config.delivery {
            DeliveryMode::Broadcast => {
                for _ in 0..self.config.size {
                    intakes.push(Intake::Own(self.queue.subscribe().await?));
                }
            }
            DeliveryMode::Shared => {
                let shared = Arc::new(Mutex::new(self.queue.subscribe().await?));
                for _ in 0..self.config.size {
                    intakes.push(Intake::Shared(Arc::clone(&shared)));
                }
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = intakes
            .into_iter()
            .enumerate()
            .map(|(id, intake)| {
                let worker = Worker {
                    id,
                    store: Arc::clone(&self.store),
                    handler: Arc::clone(&self.handler),
                    mark_processing: self.config.mark_processing,
                    retry_backoff: self.config.retry_backoff,
                };
                tokio::spawn(worker.run(intake, shutdown_rx.clone()))
            })
            .collect();

        info!(
            size = self.config.size,
            delivery = ?self.config.delivery,
            channel = %self.queue.channel(),
            "worker pool started"
        );

        Ok(PoolHandle {
            shutdown: shutdown_tx,
            workers,
        })
    }
}

/// Control handle for a running pool.
///
/// Dropping the handle stops the pool the same way [`PoolHandle::shutdown`]
/// does.
pub struct PoolHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl PoolHandle {
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop taking new messages. Task bodies already running are not
    /// interrupted.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

enum Intake {
    Own(Box<dyn Subscription>),
    Shared(Arc<Mutex<Box<dyn Subscription>>>),
}

impl Intake {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        match self {
            Intake::Own(subscription) => subscription.recv().await,
            Intake::Shared(subscription) => subscription.lock().await.recv().await,
        }
    }
}

struct Worker {
    id: usize,
    store: Arc<dyn TaskStore>,
    handler: Arc<dyn TaskHandler>,
    mark_processing: bool,
    retry_backoff: Duration,
}

impl Worker {
    async fn run(self, mut intake: Intake, mut shutdown: watch::Receiver<bool>) {
        info!(worker.id = self.id, "waiting for messages");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = intake.recv() => next,
            };

            match next {
                Ok(Some(message)) => {
                    info!(worker.id = self.id, "worker received message");
                    self.process(&message).await;
                }
                Ok(None) => {
                    info!(worker.id = self.id, "subscription closed");
                    break;
                }
                Err(e) => {
                    warn!(worker.id = self.id, error = %e, "receive failed, retrying");
                    tokio::time::sleep(self.retry_backoff).await;
                }
            }
        }

        info!(worker.id = self.id, "worker stopped");
    }

    /// Decode, execute and record one task. Every failure here is logged
    /// and swallowed so the worker keeps consuming.
    async fn process(&self, message: &[u8]) {
        let task = match Task::from_bytes(message) {
            Ok(task) => task,
            Err(e) => {
                error!(worker.id = self.id, error = %e, "error decoding task");
                metrics::worker_decode_errors().add(1, &[]);
                return;
            }
        };

        let span = start_task_span(self.id, &task.id);
        async {
            info!(payload_bytes = task.payload.len(), "received task");
            let id = task.id.to_string();

            let mut from = TaskStatus::Pending;
            if self.mark_processing {
                match self.store.update_status(&id, TaskStatus::Processing).await {
                    Ok(()) => {
                        record_status_change(&span, from.as_str(), "processing");
                        from = TaskStatus::Processing;
                    }
                    Err(e) => error!(error = %e, "error marking task processing"),
                }
            }

            let started = Instant::now();
            let status = match self.handler.execute(&task).await {
                Ok(()) => TaskStatus::Done,
                Err(e) => {
                    warn!(error = %e, "task body failed");
                    TaskStatus::Failed
                }
            };
            metrics::task_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("status", status.as_str())],
            );

            if let Err(e) = self.store.update_status(&id, status).await {
                error!(error = %e, "error updating task");
                return;
            }
            record_status_change(&span, from.as_str(), status.as_str());
            info!(%status, "task completed");
        }
        .instrument(span.clone())
        .await
    }
}
