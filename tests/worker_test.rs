//! Worker pool behaviour against the in-memory store and local queue.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use taskq::error::{Error, Result};
use taskq::model::{Task, TaskStatus};
use taskq::queue::{LocalQueue, TaskQueue};
use taskq::store::{MemoryTaskStore, TaskStore};
use taskq::worker::{DeliveryMode, PoolConfig, PoolHandle, TaskHandler, WorkerPool};

const DEADLINE: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(200);

/// Counts how many times any worker started a task body.
struct CountingWork {
    runs: Arc<AtomicUsize>,
    delay: Duration,
    fail: bool,
}

impl CountingWork {
    fn new(delay: Duration) -> (Arc<Self>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            runs: Arc::clone(&runs),
            delay,
            fail: false,
        });
        (handler, runs)
    }

    fn failing() -> (Arc<Self>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            runs: Arc::clone(&runs),
            delay: Duration::ZERO,
            fail: true,
        });
        (handler, runs)
    }
}

#[async_trait]
impl TaskHandler for CountingWork {
    async fn execute(&self, task: &Task) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(Error::Execution(format!("cannot handle {}", task.payload)));
        }
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryTaskStore>,
    queue: Arc<LocalQueue>,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryTaskStore::new()),
            queue: Arc::new(LocalQueue::new("tasks", 64)),
        }
    }

    async fn start(&self, handler: Arc<dyn TaskHandler>, config: PoolConfig) -> PoolHandle {
        WorkerPool::new(self.store.clone(), self.queue.clone(), handler, config)
            .start()
            .await
            .unwrap()
    }

    /// Store a task and publish it, the way the HTTP handler does.
    async fn submit(&self, payload: &str) -> Task {
        let task = Task::new(payload);
        self.store.create_task(&task).await.unwrap();
        self.queue.push(&task.to_bytes().unwrap()).await.unwrap();
        task
    }

    async fn status(&self, task: &Task) -> TaskStatus {
        self.store
            .get_task(&task.id.to_string())
            .await
            .unwrap()
            .status
    }

    async fn wait_for_status(&self, task: &Task, expected: TaskStatus) {
        tokio::time::timeout(DEADLINE, async {
            while self.status(task).await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("task never reached {expected}"));
    }
}

async fn wait_for_count(counter: &AtomicUsize, expected: usize) {
    tokio::time::timeout(DEADLINE, async {
        while counter.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("counter never reached {expected}"));
}

fn pool_config(size: usize, delivery: DeliveryMode) -> PoolConfig {
    PoolConfig {
        size,
        delivery,
        ..PoolConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Delivery modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_pool_runs_each_task_once_per_worker() {
    let h = Harness::new();
    let (handler, runs) = CountingWork::new(Duration::from_millis(10));
    let pool = h.start(handler, pool_config(3, DeliveryMode::Broadcast)).await;
    assert_eq!(pool.size(), 3);
    assert_eq!(h.queue.subscriber_count(), 3);

    let task = h.submit("duplicated").await;

    wait_for_count(&runs, 3).await;
    h.wait_for_status(&task, TaskStatus::Done).await;
    tokio::time::sleep(SETTLE).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn shared_pool_runs_each_task_exactly_once() {
    let h = Harness::new();
    let (handler, runs) = CountingWork::new(Duration::from_millis(10));
    let _pool = h.start(handler, pool_config(3, DeliveryMode::Shared)).await;
    assert_eq!(h.queue.subscriber_count(), 1);

    let mut tasks = Vec::new();
    for i in 0..5 {
        tasks.push(h.submit(&format!("task-{i}")).await);
    }

    for task in &tasks {
        h.wait_for_status(task, TaskStatus::Done).await;
    }
    tokio::time::sleep(SETTLE).await;
    assert_eq!(runs.load(Ordering::SeqCst), tasks.len());
}

#[tokio::test]
async fn task_published_before_any_worker_stays_pending() {
    let h = Harness::new();
    let task = h.submit("lost").await;

    let (handler, runs) = CountingWork::new(Duration::ZERO);
    let _pool = h.start(handler, pool_config(2, DeliveryMode::Broadcast)).await;

    tokio::time::sleep(SETTLE).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(h.status(&task).await, TaskStatus::Pending);
}

// ---------------------------------------------------------------------------
// Processing outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handler_error_marks_task_failed() {
    let h = Harness::new();
    let (handler, runs) = CountingWork::failing();
    let _pool = h.start(handler, pool_config(1, DeliveryMode::Shared)).await;

    let task = h.submit("doomed").await;

    h.wait_for_status(&task, TaskStatus::Failed).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bad_message_does_not_stop_the_worker() {
    let h = Harness::new();
    let (handler, runs) = CountingWork::new(Duration::ZERO);
    let _pool = h.start(handler, pool_config(1, DeliveryMode::Broadcast)).await;

    h.queue.push(b"definitely not a task").await.unwrap();
    let task = h.submit("after the garbage").await;

    h.wait_for_status(&task, TaskStatus::Done).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_task_is_executed_but_never_recorded() {
    let h = Harness::new();
    let (handler, runs) = CountingWork::new(Duration::ZERO);
    let _pool = h.start(handler, pool_config(1, DeliveryMode::Broadcast)).await;

    // Published without a store record.
    let ghost = Task::new("ghost");
    h.queue.push(&ghost.to_bytes().unwrap()).await.unwrap();
    wait_for_count(&runs, 1).await;

    let task = h.submit("real").await;
    h.wait_for_status(&task, TaskStatus::Done).await;
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn mark_processing_is_visible_while_body_runs() {
    let h = Harness::new();
    let (handler, runs) = CountingWork::new(Duration::from_millis(300));
    let config = PoolConfig {
        mark_processing: true,
        ..pool_config(1, DeliveryMode::Broadcast)
    };
    let _pool = h.start(handler, config).await;

    let task = h.submit("slow").await;

    wait_for_count(&runs, 1).await;
    assert_eq!(h.status(&task).await, TaskStatus::Processing);
    h.wait_for_status(&task, TaskStatus::Done).await;
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_lets_running_task_finish_and_stops_intake() {
    let h = Harness::new();
    let (handler, runs) = CountingWork::new(Duration::from_millis(200));
    let pool = h.start(handler, pool_config(1, DeliveryMode::Broadcast)).await;

    let running = h.submit("in flight").await;
    wait_for_count(&runs, 1).await;

    pool.shutdown();
    tokio::time::timeout(DEADLINE, pool.join()).await.unwrap();

    assert_eq!(h.status(&running).await, TaskStatus::Done);
    assert_eq!(h.queue.subscriber_count(), 0);

    let late = h.submit("after shutdown").await;
    tokio::time::sleep(SETTLE).await;
    assert_eq!(h.status(&late).await, TaskStatus::Pending);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn idle_pool_stops_promptly() {
    let h = Harness::new();
    let (handler, _runs) = CountingWork::new(Duration::ZERO);
    let pool = h.start(handler, pool_config(4, DeliveryMode::Shared)).await;

    pool.shutdown();
    tokio::time::timeout(Duration::from_secs(1), pool.join())
        .await
        .expect("idle workers should exit on shutdown");
}

#[tokio::test]
async fn zero_sized_pool_is_rejected() {
    let h = Harness::new();
    let (handler, _runs) = CountingWork::new(Duration::ZERO);
    let result = WorkerPool::new(
        h.store.clone(),
        h.queue.clone(),
        handler,
        pool_config(0, DeliveryMode::Broadcast),
    )
    .start()
    .await;
    assert!(matches!(result, Err(Error::Config(_))));
}
