//! taskq CLI: run the API and worker pool, or inspect tasks.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use taskq::config::{Config, QueueBackend};
use taskq::model::Task;
use taskq::queue::{TaskQueue, build_queue};
use taskq::server::{AppState, router};
use taskq::store::{StoreHandle, connect_store};
use taskq::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use taskq::worker::{PoolConfig, PoolHandle, SimulatedWork, WorkerPool};
use tracing::info;

#[derive(Parser)]
#[command(name = "taskq", about = "Task intake, dispatch and status tracking")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the worker pool in one process
    Serve,
    /// Run only the HTTP API (requires QUEUE_BACKEND=postgres)
    Api,
    /// Run only the worker pool (requires QUEUE_BACKEND=postgres)
    Worker {
        /// Override POOL_SIZE
        #[arg(long)]
        size: Option<usize>,
    },
    /// Task operations against the durable store
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create and publish a task
    Submit {
        /// Opaque task payload
        payload: String,
    },
    /// Show a task's status
    Status {
        /// Task ID
        id: String,
        /// Poll until the task reaches done or failed
        #[arg(long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Serve => cmd_serve(config).await,
        Command::Api => {
            require_postgres_queue(&config, "api")?;
            cmd_api(config).await
        }
        Command::Worker { size } => {
            require_postgres_queue(&config, "worker")?;
            if let Some(size) = size {
                config.pool.size = size;
            }
            cmd_worker(config).await
        }
        Command::Task { action } => {
            // Operator commands are pointless against a fresh in-memory store.
            config.store.mem_fallback = false;
            let handle = connect_store(&config.store).await?;
            match action {
                TaskAction::Submit { payload } => {
                    require_postgres_queue(&config, "task submit")?;
                    let queue = build_queue(&config.queue, handle.db.as_ref())?;
                    cmd_task_submit(&handle, queue.as_ref(), payload).await
                }
                TaskAction::Status { id, wait } => cmd_task_status(&handle, &id, wait).await,
            }
        }
    }
}

fn require_postgres_queue(config: &Config, command: &str) -> anyhow::Result<()> {
    if config.queue.backend != QueueBackend::Postgres {
        anyhow::bail!(
            "'{command}' runs in its own process and needs QUEUE_BACKEND=postgres; \
             use 'serve' for the in-process queue"
        );
    }
    Ok(())
}

fn telemetry(config: &Config, service_name: &str) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: service_name.to_string(),
        log_level: config.log_level.clone(),
    })?)
}

async fn start_pool(
    config: &Config,
    handle: &StoreHandle,
    queue: Arc<dyn TaskQueue>,
) -> anyhow::Result<PoolHandle> {
    let pool = WorkerPool::new(
        Arc::clone(&handle.store),
        queue,
        Arc::new(SimulatedWork::new(config.pool.work_delay)),
        PoolConfig {
            size: config.pool.size,
            delivery: config.pool.delivery,
            ..PoolConfig::default()
        },
    );
    Ok(pool.start().await?)
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let _guard = telemetry(&config, "taskq")?;

    let handle = connect_store(&config.store).await?;
    let queue = build_queue(&config.queue, handle.db.as_ref())?;
    let pool = start_pool(&config, &handle, Arc::clone(&queue)).await?;

    let state = AppState {
        store: Arc::clone(&handle.store),
        queue,
    };
    serve_http(&config, state).await?;

    // No drain: in-flight task bodies are abandoned when the runtime exits.
    pool.shutdown();
    Ok(())
}

async fn cmd_api(config: Config) -> anyhow::Result<()> {
    let _guard = telemetry(&config, "taskq-api")?;

    let handle = connect_store(&config.store).await?;
    let queue = build_queue(&config.queue, handle.db.as_ref())?;
    serve_http(
        &config,
        AppState {
            store: handle.store,
            queue,
        },
    )
    .await
}

async fn cmd_worker(config: Config) -> anyhow::Result<()> {
    let _guard = telemetry(&config, "taskq-worker")?;

    let handle = connect_store(&config.store).await?;
    let queue = build_queue(&config.queue, handle.db.as_ref())?;
    let pool = start_pool(&config, &handle, queue).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("received shut down signal");
    pool.shutdown();
    Ok(())
}

async fn serve_http(config: &Config, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!(address = %config.http_addr, "server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down server");
        })
        .await
        .context("server error")?;
    Ok(())
}

async fn cmd_task_submit(
    handle: &StoreHandle,
    queue: &dyn TaskQueue,
    payload: String,
) -> anyhow::Result<()> {
    let task = Task::new(payload);
    handle.store.create_task(&task).await?;
    queue.push(&task.to_bytes()?).await?;
    println!("{}", task.id);
    Ok(())
}

async fn cmd_task_status(handle: &StoreHandle, id: &str, wait: bool) -> anyhow::Result<()> {
    let mut task = handle.store.get_task(id).await?;
    while wait && !task.status.is_terminal() {
        tokio::time::sleep(Duration::from_millis(500)).await;
        task = handle.store.get_task(id).await?;
    }

    println!("ID:       {}", task.id);
    println!("Status:   {}", task.status);
    println!("Payload:  {}", task.payload);
    Ok(())
}
