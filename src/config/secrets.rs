//! Secret handling utilities.
//!
//! Re-exports secrecy types used for database credentials.

pub use secrecy::{ExposeSecret, SecretString};
