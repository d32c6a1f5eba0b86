//! # Catalog Search
//!
//! Semantic product search for e-commerce catalogs, with the pipeline that keeps product
//! embeddings in sync with the relational store.
//!
//! ## Features
//!
//! - **Semantic search**: embed the query, find the nearest product embeddings, enrich
//!   hits with live product records
//! - **Keyword fallback**: any embedding or vector store outage degrades to substring
//!   search instead of an error
//! - **Embedding sync**: product creates, updates and deletes are mirrored into the vector
//!   store; failures land in a dead-letter registry with exponential backoff
//! - **Observability**: per-mode latency percentiles, cache hit rate, cost estimate and a
//!   failure-rate monitor with throttled alerts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use catalog_search::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> catalog_search::Result<()> {
//! let config = SearchConfig::new();
//! let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
//! let products = Arc::new(InMemoryProductRepository::new());
//! let vectors = Arc::new(InMemoryVectorStore::new());
//! let embedder: Arc<dyn EmbeddingClient> = Arc::new(HashingEmbeddingClient::new());
//!
//! let semantic = SemanticSearchEngine::new(
//!     embedder,
//!     Arc::new(EmbeddingCache::new(kv)),
//!     vectors,
//!     products.clone(),
//!     &config,
//! );
//! let router = SearchRouter::new(
//!     Arc::new(semantic),
//!     Arc::new(KeywordSearchEngine::new(products)),
//! );
//!
//! let result = router
//!     .search(&SearchQuery::new("gaming laptop"), "semantic")
//!     .await;
//! println!("{} products via {}", result.total_results(), result.mode());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Shared helpers: environment loading, timeouts and retries
pub mod common;

/// Layered configuration
pub mod config;

/// Embedding providers, query-embedding cache and canonical product text
pub mod embedding;

/// Error types
pub mod error;

/// Shared key-value store abstraction
pub mod kv;

/// Search metrics aggregation
pub mod metrics;

/// Product repository abstraction
pub mod products;

/// Semantic search, keyword fallback and routing
pub mod search;

/// Embedding sync, dead-letter registry and failure monitoring
pub mod sync;

/// Core data types
pub mod types;

/// Vector store abstraction
pub mod vector_store;

pub use config::{SearchConfig, SimilarityProfile};
pub use embedding::{EmbeddingCache, EmbeddingClient, EmbeddingTextBuilder};
pub use error::{ErrorChainExt, Result, SearchError};
pub use kv::KeyValueStore;
pub use metrics::{MetricsReport, SearchMetricsCollector};
pub use products::ProductRepository;
pub use search::{KeywordSearchEngine, SearchRouter, SemanticSearchEngine};
pub use sync::{EmbeddingSyncOrchestrator, ProductEvent, RetrySweeper};
pub use types::{
    Product, ProductEmbeddingDocument, ProductId, SearchMode, SearchQuery, SearchResult,
    EMBEDDING_DIMENSIONS, MAX_SEARCH_LIMIT, MAX_SEARCH_OFFSET,
};
pub use vector_store::VectorStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        EmbeddingCache, EmbeddingClient, EmbeddingSyncOrchestrator, EmbeddingTextBuilder,
        KeyValueStore, KeywordSearchEngine, Product, ProductEvent, ProductId,
        ProductRepository, Result, RetrySweeper, SearchConfig, SearchError, SearchMode,
        SearchQuery, SearchResult, SearchRouter, SemanticSearchEngine, SimilarityProfile,
        VectorStore,
    };

    pub use crate::embedding::{HashingEmbeddingClient, HttpEmbeddingClient};
    pub use crate::kv::InMemoryKeyValueStore;
    pub use crate::products::InMemoryProductRepository;
    pub use crate::search::{SearchContext, SearchEvent, SearchEventPublisher};
    pub use crate::sync::{
        DeadLetterRegistry, FailureRateMonitor, InMemoryDeadLetterRegistry, SyncOutcome,
    };
    pub use crate::vector_store::InMemoryVectorStore;
}

/// Test utilities for unit and integration tests
#[doc(hidden)]
pub mod test_utils;
