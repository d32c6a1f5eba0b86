//! Query-embedding cache on top of the shared key-value store
//!
//! The cache never fails a caller. Backend errors, timeouts and corrupt entries all read
//! as a miss, and failed writes are logged and dropped.

use crate::common::with_timeout;
use crate::kv::KeyValueStore;
use crate::types::EMBEDDING_DIMENSIONS;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Prefix of every key written by the embedding cache
pub const CACHE_KEY_PREFIX: &str = "embedding:query:";

/// Default lifetime of a cached query embedding
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default deadline for a single cache round trip
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(250);

/// Hit/miss counters since the cache was created or last cleared
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that returned a usable vector
    pub hits: u64,
    /// Lookups that returned nothing, including backend failures
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 when no lookups happened
    pub hit_rate: f64,
}

/// Caches query embeddings keyed by the normalized query text
pub struct EmbeddingCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .field("stats", &self.stats())
            .finish()
    }
}

impl EmbeddingCache {
    /// Cache with the default TTL and timeout
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_settings(store, DEFAULT_CACHE_TTL, DEFAULT_CACHE_TIMEOUT)
    }

    /// Cache with explicit TTL and per-call timeout
    pub fn with_settings(store: Arc<dyn KeyValueStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Key for a query: prefix plus the MD5 of the trimmed, lowercased text
    pub fn cache_key(query: &str) -> String {
        let normalized = query.trim().to_lowercase();
        format!("{}{:x}", CACHE_KEY_PREFIX, md5::compute(normalized.as_bytes()))
    }

    /// Look up a cached embedding; anything but a well-formed vector is a miss
    pub async fn get(&self, query: &str) -> Option<Vec<f32>> {
        let key = Self::cache_key(query);
        let found = match with_timeout("cache get", self.timeout, self.store.get(&key)).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<f32>>(&raw) {
                Ok(vector) if vector.len() == EMBEDDING_DIMENSIONS => Some(vector),
                Ok(vector) => {
                    tracing::warn!(
                        "Ignoring cached embedding {} with {} dimensions",
                        key,
                        vector.len()
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!("Ignoring corrupt cached embedding {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Embedding cache read failed, treating as miss: {}", e);
                None
            }
        };

        match found {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an embedding, returning whether it was written
    pub async fn set(&self, query: &str, embedding: &[f32]) -> bool {
        if embedding.len() != EMBEDDING_DIMENSIONS {
            tracing::warn!(
                "Refusing to cache embedding with {} dimensions",
                embedding.len()
            );
            return false;
        }

        let key = Self::cache_key(query);
        let payload = match serde_json::to_string(embedding) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to serialize embedding for cache: {}", e);
                return false;
            }
        };

        match with_timeout(
            "cache set",
            self.timeout,
            self.store.set(&key, payload, Some(self.ttl)),
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Embedding cache write failed: {}", e);
                false
            }
        }
    }

    /// Delete every cached query embedding in the store and reset the counters
    ///
    /// Other caches sharing the store lose their entries too.
    pub async fn clear(&self) -> usize {
        let removed = match with_timeout(
            "cache clear",
            self.timeout,
            self.store.delete_prefix(CACHE_KEY_PREFIX),
        )
        .await
        {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Failed to clear cached embeddings: {}", e);
                0
            }
        };
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        tracing::debug!("Cleared {} cached query embeddings", removed);
        removed
    }

    /// Current hit/miss counters
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
