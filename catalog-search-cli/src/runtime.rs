//! Wiring of the library components over in-process stores

use anyhow::{Context, Result};
use catalog_search::embedding::{
    EmbeddingCache, EmbeddingClient, HashingEmbeddingClient, HttpEmbeddingClient,
};
use catalog_search::kv::{InMemoryKeyValueStore, KeyValueStore};
use catalog_search::metrics::SearchMetricsCollector;
use catalog_search::products::{InMemoryProductRepository, ProductRepository};
use catalog_search::search::{
    KeywordSearchEngine, LoggingEventPublisher, SearchRouter, SemanticSearchEngine,
};
use catalog_search::sync::{
    EmbeddingSyncOrchestrator, FailureRateMonitor, InMemoryDeadLetterRegistry,
    LoggingAlertNotifier, ProductEvent, SyncReport,
};
use catalog_search::vector_store::InMemoryVectorStore;
use catalog_search::SearchConfig;
use std::path::Path;
use std::sync::Arc;

/// Every component a command may need, sharing one key-value store
pub struct Runtime {
    pub config: SearchConfig,
    pub products: Arc<InMemoryProductRepository>,
    pub dead_letters: Arc<InMemoryDeadLetterRegistry>,
    pub orchestrator: Arc<EmbeddingSyncOrchestrator>,
    pub router: SearchRouter,
    pub metrics: Arc<SearchMetricsCollector>,
}

/// Defaults, environment and either the given file or the discovered one
pub fn load_config(path: Option<&Path>) -> Result<SearchConfig> {
    let config = match path {
        Some(path) => SearchConfig::load_with_file(path)?,
        None => SearchConfig::new(),
    };
    config.validate()?;
    Ok(config)
}

fn embedder(config: &SearchConfig) -> Result<Arc<dyn EmbeddingClient>> {
    if config.embedding_api_key.is_some() {
        let client = HttpEmbeddingClient::new(config.http_embedding_config())
            .context("configuring the embedding API client")?;
        tracing::info!("Using embedding model {}", client.model_id());
        Ok(Arc::new(client))
    } else {
        tracing::info!("No embedding API key configured, using the local hashing model");
        Ok(Arc::new(HashingEmbeddingClient::new()))
    }
}

impl Runtime {
    /// Load the catalog and dead-letter file and wire every component
    pub fn load(config: SearchConfig, catalog: &Path, dead_letters: Option<&Path>) -> Result<Self> {
        let products = Arc::new(
            InMemoryProductRepository::load_json(catalog)
                .with_context(|| format!("loading catalog {}", catalog.display()))?,
        );
        let dead_letters = Arc::new(match dead_letters {
            Some(path) => InMemoryDeadLetterRegistry::load_json(path)
                .with_context(|| format!("loading dead-letter file {}", path.display()))?,
            None => InMemoryDeadLetterRegistry::new(),
        });

        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let embedder = embedder(&config)?;
        let vectors = Arc::new(InMemoryVectorStore::new());
        let metrics = Arc::new(SearchMetricsCollector::new(kv.clone(), &config));

        let monitor = Arc::new(FailureRateMonitor::new(
            kv.clone(),
            Arc::new(LoggingAlertNotifier),
            &config,
        ));
        let orchestrator = Arc::new(EmbeddingSyncOrchestrator::new(
            embedder.clone(),
            vectors.clone(),
            dead_letters.clone(),
            monitor,
            &config,
        ));

        let cache = Arc::new(EmbeddingCache::with_settings(
            kv,
            config.cache_ttl(),
            config.cache_timeout(),
        ));
        let semantic = Arc::new(
            SemanticSearchEngine::new(embedder, cache, vectors, products.clone(), &config)
                .with_metrics(metrics.clone()),
        );
        let router = SearchRouter::new(
            semantic,
            Arc::new(KeywordSearchEngine::new(products.clone())),
        )
        .with_metrics(metrics.clone())
        .with_publisher(Arc::new(LoggingEventPublisher));

        Ok(Self {
            config,
            products,
            dead_letters,
            orchestrator,
            router,
            metrics,
        })
    }

    /// Embed every catalog product, dead-lettering failures
    pub async fn index(&self) -> Result<SyncReport> {
        let products = self.products.find_all().await?;
        Ok(self.orchestrator.sync_all(products).await)
    }

    /// Load the vector store without touching the dead-letter registry or the monitor
    ///
    /// Returns how many products could not be embedded.
    pub async fn warm(&self) -> Result<usize> {
        let mut failed = 0;
        for product in self.products.find_all().await? {
            let id = product.id.clone();
            if let Err(e) = self.orchestrator.sync(&ProductEvent::updated(product)).await {
                tracing::debug!("Product {} left out of the vector store: {}", id, e);
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::warn!(
                "{} products could not be indexed and are missing from semantic results",
                failed
            );
        }
        Ok(failed)
    }

    /// Write the dead-letter registry back to disk
    pub fn save_dead_letters(&self, path: &Path) -> Result<()> {
        self.dead_letters
            .save_json(path)
            .with_context(|| format!("writing dead-letter file {}", path.display()))
    }
}
