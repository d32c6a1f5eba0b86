//! Shared key-value state used by the embedding cache, the failure-rate monitor and
//! search metrics
//!
//! The production deployment points this at an external store (Redis or similar).
//! Implementations must make [`KeyValueStore::incr`] atomic at the key level; callers
//! never read-modify-write counters themselves.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub mod memory;

pub use memory::{InMemoryKeyValueStore, MemoryStoreConfig};

/// Generic key-value backend with per-key expiry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; expired keys read as `None`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous value and expiry
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every key starting with `prefix`, returning how many live keys went away
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    /// Atomically increment an integer counter, creating it at zero; keeps an existing expiry
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Set the expiry of an existing key, returning whether the key existed
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Append to a list, evicting the oldest entries beyond `cap`
    async fn push_capped(&self, key: &str, value: String, cap: usize) -> Result<()>;

    /// Read a whole list, oldest first; missing keys read as empty
    async fn list(&self, key: &str) -> Result<Vec<String>>;
}
