//! In-process [`KeyValueStore`] backed by a concurrent map
//!
//! Expiry is lazy: an expired entry is dropped the next time its key is touched, or in
//! bulk by [`InMemoryKeyValueStore::purge_expired`]. Every mutation goes through a
//! single `DashMap` entry guard, which makes increments atomic per key.

use super::KeyValueStore;
use crate::error::{Result, SearchError};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Counter(i64),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: StoredValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Behaviour knobs for exercising failure paths in tests and demos
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfig {
    /// Artificial latency added to every operation
    pub operation_delay: Option<Duration>,
}

/// In-memory key-value store with TTLs, atomic counters and capped lists
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<DashMap<String, StoredEntry>>,
    unavailable: Arc<AtomicBool>,
    config: Arc<RwLock<MemoryStoreConfig>>,
}

impl InMemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with custom behaviour
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            ..Self::default()
        }
    }

    /// Simulate the backend being unreachable: every operation fails with a cache error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Change the artificial per-operation latency
    pub fn set_operation_delay(&self, delay: Option<Duration>) {
        if let Ok(mut config) = self.config.write() {
            config.operation_delay = delay;
        }
    }

    /// Number of live (non-expired) keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Remaining time to live of a key, if it exists and has an expiry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    async fn before_operation(&self) -> Result<()> {
        let delay = self
            .config
            .read()
            .ok()
            .and_then(|config| config.operation_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SearchError::Cache("key-value store unavailable".to_string()));
        }
        Ok(())
    }

    fn live_entry(&self, key: &str) -> Option<StoredEntry> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.clone())?;
        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.before_operation().await?;
        match self.live_entry(key).map(|e| e.value) {
            None => Ok(None),
            Some(StoredValue::Text(text)) => Ok(Some(text)),
            Some(StoredValue::Counter(n)) => Ok(Some(n.to_string())),
            Some(StoredValue::List(_)) => Err(SearchError::Cache(format!(
                "key '{key}' holds a list, not a value"
            ))),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        self.before_operation().await?;
        self.entries
            .insert(key.to_string(), StoredEntry::new(StoredValue::Text(value), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.before_operation().await?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, e)| !e.is_expired(now))
            .unwrap_or(false))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        self.before_operation().await?;
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            if !key.starts_with(prefix) {
                return true;
            }
            if !entry.is_expired(now) {
                removed += 1;
            }
            false
        });
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.before_operation().await?;
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = StoredEntry::new(StoredValue::Counter(1), None);
                    return Ok(1);
                }
                let next = match &entry.value {
                    StoredValue::Counter(n) => n + 1,
                    StoredValue::Text(text) => match text.trim().parse::<i64>() {
                        Ok(n) => n + 1,
                        Err(_) => {
                            return Err(SearchError::Cache(format!(
                                "key '{key}' does not hold an integer"
                            )))
                        }
                    },
                    StoredValue::List(_) => {
                        return Err(SearchError::Cache(format!(
                            "key '{key}' holds a list, not a counter"
                        )))
                    }
                };
                entry.value = StoredValue::Counter(next);
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(StoredValue::Counter(1), None));
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.before_operation().await?;
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn push_capped(&self, key: &str, value: String, cap: usize) -> Result<()> {
        self.before_operation().await?;
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredEntry::new(StoredValue::List(VecDeque::new()), None));
        if entry.is_expired(now) {
            *entry = StoredEntry::new(StoredValue::List(VecDeque::new()), None);
        }
        match &mut entry.value {
            StoredValue::List(items) => {
                items.push_back(value);
                while items.len() > cap {
                    items.pop_front();
                }
                Ok(())
            }
            _ => Err(SearchError::Cache(format!("key '{key}' does not hold a list"))),
        }
    }

    async fn list(&self, key: &str) -> Result<Vec<String>> {
        self.before_operation().await?;
        match self.live_entry(key).map(|e| e.value) {
            None => Ok(Vec::new()),
            Some(StoredValue::List(items)) => Ok(items.into_iter().collect()),
            Some(_) => Err(SearchError::Cache(format!("key '{key}' does not hold a list"))),
        }
    }
}
