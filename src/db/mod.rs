//! Database connection pool, migrations, and health check.
//!
//! Shared Postgres connection pool used by the durable task store and the
//! LISTEN/NOTIFY queue.

use crate::config::StoreConfig;
use crate::config::secrets::ExposeSecret;
use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgListener, PgPoolOptions};
use std::time::Duration;

/// Database handle. Owns the connection pool shared across all modules.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres from a connection URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = pool_options().connect(url).await?;
        Ok(Self { pool })
    }

    /// Connect to Postgres from discrete store settings.
    pub async fn connect_with(config: &StoreConfig) -> Result<Self> {
        let (host, port) = config.host_port()?;
        let mut options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(&config.user)
            .database(&config.db_name);
        if let Some(ref password) = config.password {
            options = options.password(password.expose_secret());
        }
        let pool = pool_options().connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check, run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Open a LISTEN connection outside the shared pool.
    ///
    /// A listener pins its connection until dropped; it must never hold a
    /// slot in the shared pool.
    pub(crate) async fn listener(&self) -> Result<PgListener> {
        let options = (*self.pool.connect_options()).clone();
        let dedicated = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;
        Ok(PgListener::connect_with(&dedicated).await?)
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
}
