//! # taskq
//!
//! Task intake and asynchronous dispatch.
//!
//! Tasks are recorded in a status store (Postgres, or an in-memory
//! fallback), published over a fan-out channel (Postgres LISTEN/NOTIFY or an
//! in-process broadcast), executed by a fixed-size worker pool and polled
//! over HTTP.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod queue;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod worker;
