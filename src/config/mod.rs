//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed values. Every setting has
//! a default so a bare `taskq serve` runs against a local Postgres, or the
//! in-memory store when none is reachable. The database password is wrapped
//! in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use crate::worker::DeliveryMode;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub pool: PoolSettings,
    pub http_addr: SocketAddr,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Connection settings for the task store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `host:port` of the Postgres server.
    pub addr: String,
    pub user: String,
    pub password: Option<SecretString>,
    pub db_name: String,
    /// Substitute the in-memory store when Postgres cannot be reached.
    pub mem_fallback: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:5432".to_string(),
            user: "postgres".to_string(),
            password: None,
            db_name: "queue".to_string(),
            mem_fallback: true,
        }
    }
}

impl StoreConfig {
    /// Split `addr` into host and port. A missing port means 5432.
    pub fn host_port(&self) -> Result<(&str, u16)> {
        match self.addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid port in DB_ADDR: {}", self.addr)))?;
                Ok((host, port))
            }
            None => Ok((self.addr.as_str(), 5432)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// In-process broadcast channel. Producer and pool must share a process.
    Local,
    /// Postgres LISTEN/NOTIFY.
    Postgres,
}

impl FromStr for QueueBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(QueueBackend::Local),
            "postgres" => Ok(QueueBackend::Postgres),
            other => Err(Error::Config(format!(
                "QUEUE_BACKEND must be 'local' or 'postgres', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub channel: String,
}

/// Worker pool settings as read from the environment.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub size: usize,
    pub delivery: DeliveryMode,
    pub work_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = StoreConfig::default();
        let store = StoreConfig {
            addr: var_or("DB_ADDR", &defaults.addr),
            user: var_or("DB_USER", &defaults.user),
            password: std::env::var("DB_PASSWORD").ok().map(SecretString::from),
            db_name: var_or("DB_NAME", &defaults.db_name),
            mem_fallback: parsed_var("MEM_FALLBACK", defaults.mem_fallback)?,
        };
        store.host_port()?;

        let queue = QueueConfig {
            backend: var_or("QUEUE_BACKEND", "local").parse()?,
            channel: var_or("QUEUE_CHANNEL", "tasks"),
        };
        if queue.channel.is_empty() {
            return Err(Error::Config("QUEUE_CHANNEL must not be empty".to_string()));
        }

        let size: usize = parsed_var("POOL_SIZE", 10)?;
        if size == 0 {
            return Err(Error::Config("POOL_SIZE must be at least 1".to_string()));
        }
        let pool = PoolSettings {
            size,
            delivery: var_or("DELIVERY_MODE", "broadcast").parse()?,
            work_delay: Duration::from_millis(parsed_var("WORK_DELAY_MS", 5000)?),
        };

        Ok(Self {
            store,
            queue,
            pool,
            http_addr: parsed_var("HTTP_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("invalid value for {name} ('{raw}'): {e}"))),
        Err(_) => Ok(default),
    }
}
