//! Common utilities module
//!
//! Shared helpers used across the search and sync pipelines.

/// Environment variable loading utilities
pub mod env_loader;

/// Deadlines and bounded in-request retries for external calls
pub mod retry;

pub use env_loader::{load_env_optional, load_env_parsed, load_env_string, EnvLoader};
pub use retry::{retry_linear, with_timeout, RetryPolicy, MAX_IMMEDIATE_ATTEMPTS};
