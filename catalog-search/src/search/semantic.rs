//! Vector similarity search over product embeddings
//!
//! A search embeds the query (through the cache), asks the vector store for the nearest
//! documents, pages through them in memory and enriches every hit with the current
//! product record. Embedding and vector store failures surface as
//! [`SearchError::SearchUnavailable`] so the router can fall back to keyword search.

use crate::common::with_timeout;
use crate::config::{SearchConfig, SimilarityProfile};
use crate::embedding::{EmbeddingCache, EmbeddingClient};
use crate::error::{Result, SearchError};
use crate::metrics::SearchMetricsCollector;
use crate::products::ProductRepository;
use crate::types::{
    validate_dimensions, Product, ProductId, SearchMode, SearchQuery, SearchResult,
    MAX_SEARCH_LIMIT, MAX_SEARCH_OFFSET,
};
use crate::vector_store::{VectorHit, VectorStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum Signal {
    CacheHit,
    CacheMiss,
    ApiCall,
}

/// Semantic search engine
pub struct SemanticSearchEngine {
    embedder: Arc<dyn EmbeddingClient>,
    cache: Arc<EmbeddingCache>,
    vector_store: Arc<dyn VectorStore>,
    products: Arc<dyn ProductRepository>,
    metrics: Option<Arc<SearchMetricsCollector>>,
    embedding_timeout: Duration,
    vector_store_timeout: Duration,
    recommendation_min_similarity: f32,
}

impl SemanticSearchEngine {
    /// Wire an engine to its collaborators
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        cache: Arc<EmbeddingCache>,
        vector_store: Arc<dyn VectorStore>,
        products: Arc<dyn ProductRepository>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            embedder,
            cache,
            vector_store,
            products,
            metrics: None,
            embedding_timeout: config.embedding_timeout(),
            vector_store_timeout: config.vector_store_timeout(),
            recommendation_min_similarity: config.min_similarity(SimilarityProfile::Recommendation),
        }
    }

    /// Count cache hits, misses and provider calls in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<SearchMetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run a semantic search
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let started = Instant::now();
        let limit = query.effective_limit();
        if query.requested_limit() > MAX_SEARCH_LIMIT {
            tracing::warn!(
                "Requested limit {} exceeds maximum, clamped to {}",
                query.requested_limit(),
                MAX_SEARCH_LIMIT
            );
        }
        if query.text().trim().is_empty() {
            return Err(SearchError::Validation(
                "search query cannot be empty".to_string(),
            ));
        }

        if query.offset() > MAX_SEARCH_OFFSET {
            tracing::debug!(
                "Offset {} is past the deepest page ({}), returning no products",
                query.offset(),
                MAX_SEARCH_OFFSET
            );
            return Ok(into_result(Vec::new(), started));
        }

        let embedding = self
            .query_embedding(query.text())
            .await
            .map_err(SearchError::unavailable)?;

        let hits = with_timeout(
            "vector search",
            self.vector_store_timeout,
            self.vector_store.search_similar(
                &embedding,
                limit.saturating_add(query.offset()),
                query.min_similarity(),
            ),
        )
        .await
        .map_err(SearchError::unavailable)?;

        let page: Vec<VectorHit> = hits.into_iter().skip(query.offset()).collect();
        let mut ranked = dedupe_by_product(self.enrich(page).await?);
        if let Some(category) = query.category() {
            ranked.retain(|(product, _)| product.in_category(category));
        }
        ranked.truncate(limit);

        let result = into_result(ranked, started);
        tracing::debug!(
            "Semantic search for '{}' returned {} products in {:.1}ms",
            query.text(),
            result.total_results(),
            result.execution_time_ms()
        );
        Ok(result)
    }

    /// Products whose stored embeddings are closest to `product_id`'s, excluding itself
    ///
    /// Uses the recommendation similarity threshold. A product without a stored
    /// embedding has no recommendations.
    pub async fn find_similar(&self, product_id: &ProductId, limit: usize) -> Result<SearchResult> {
        let started = Instant::now();
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);

        let document = with_timeout(
            "vector lookup",
            self.vector_store_timeout,
            self.vector_store.get(product_id),
        )
        .await
        .map_err(SearchError::unavailable)?;
        let Some(document) = document else {
            tracing::debug!("Product {} has no stored embedding", product_id);
            return Ok(SearchResult::empty(SearchMode::Semantic));
        };

        let hits = with_timeout(
            "vector search",
            self.vector_store_timeout,
            self.vector_store.search_similar(
                &document.embedding,
                limit + 1,
                self.recommendation_min_similarity,
            ),
        )
        .await
        .map_err(SearchError::unavailable)?;

        let others: Vec<VectorHit> = hits
            .into_iter()
            .filter(|hit| &hit.product_id != product_id)
            .collect();
        let mut ranked = dedupe_by_product(self.enrich(others).await?);
        ranked.truncate(limit);
        Ok(into_result(ranked, started))
    }

    async fn query_embedding(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(embedding) = self.cache.get(text).await {
            tracing::debug!("Query embedding cache hit for '{}'", text);
            self.track(Signal::CacheHit).await;
            return Ok(embedding);
        }
        self.track(Signal::CacheMiss).await;
        self.track(Signal::ApiCall).await;

        let embedding = with_timeout(
            "embedding generation",
            self.embedding_timeout,
            self.embedder.generate_embedding(text),
        )
        .await?;
        validate_dimensions(&embedding)
            .map_err(|e| SearchError::EmbeddingGeneration(e.to_string()))?;

        self.cache.set(text, &embedding).await;
        Ok(embedding)
    }

    async fn enrich(&self, hits: Vec<VectorHit>) -> Result<Vec<(Product, f32)>> {
        let mut enriched = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.products.find_by_id(&hit.product_id).await? {
                Some(product) => enriched.push((product, hit.similarity)),
                None => tracing::warn!(
                    "Dropping vector hit for missing product {}",
                    hit.product_id
                ),
            }
        }
        Ok(enriched)
    }

    async fn track(&self, signal: Signal) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let recorded = match signal {
            Signal::CacheHit => metrics.record_cache_hit().await,
            Signal::CacheMiss => metrics.record_cache_miss().await,
            Signal::ApiCall => metrics.record_api_call().await,
        };
        if let Err(e) = recorded {
            tracing::warn!("Failed to record {:?} metric: {}", signal, e);
        }
    }
}

/// Keep one entry per product with its highest score, ordered by descending score
fn dedupe_by_product(hits: Vec<(Product, f32)>) -> Vec<(Product, f32)> {
    let mut positions: HashMap<ProductId, usize> = HashMap::new();
    let mut unique: Vec<(Product, f32)> = Vec::with_capacity(hits.len());
    for (product, score) in hits {
        match positions.get(&product.id) {
            Some(&index) => {
                if score > unique[index].1 {
                    unique[index] = (product, score);
                }
            }
            None => {
                positions.insert(product.id.clone(), unique.len());
                unique.push((product, score));
            }
        }
    }
    unique.sort_by(|a, b| b.1.total_cmp(&a.1));
    unique
}

fn into_result(ranked: Vec<(Product, f32)>, started: Instant) -> SearchResult {
    let scores: HashMap<ProductId, f32> = ranked
        .iter()
        .map(|(product, score)| (product.id.clone(), *score))
        .collect();
    let products: Vec<Product> = ranked.into_iter().map(|(product, _)| product).collect();
    let total = products.len();
    SearchResult::new(
        products,
        scores,
        SearchMode::Semantic,
        total,
        started.elapsed().as_secs_f64() * 1000.0,
    )
}
