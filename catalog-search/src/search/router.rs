//! Search facade choosing between semantic and keyword search
//!
//! [`SearchRouter::search`] never fails. Semantic failures fall back to keyword search,
//! keyword failures degrade to an empty result, and metrics and events are recorded on a
//! best-effort basis.

use super::events::{SearchContext, SearchEvent, SearchEventPublisher};
use super::keyword::KeywordSearchEngine;
use super::semantic::SemanticSearchEngine;
use crate::metrics::SearchMetricsCollector;
use crate::types::{ProductId, SearchMode, SearchQuery, SearchResult};
use chrono::Utc;
use std::sync::Arc;

/// Entry point for every search
pub struct SearchRouter {
    semantic: Arc<SemanticSearchEngine>,
    keyword: Arc<KeywordSearchEngine>,
    metrics: Option<Arc<SearchMetricsCollector>>,
    publisher: Option<Arc<dyn SearchEventPublisher>>,
}

impl SearchRouter {
    /// Router over the two engines, without metrics or events
    pub fn new(semantic: Arc<SemanticSearchEngine>, keyword: Arc<KeywordSearchEngine>) -> Self {
        Self {
            semantic,
            keyword,
            metrics: None,
            publisher: None,
        }
    }

    /// Record every search in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<SearchMetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Publish an event for every search
    pub fn with_publisher(mut self, publisher: Arc<dyn SearchEventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Normalize a mode name; anything unrecognized means semantic
    pub fn resolve_mode(mode: &str) -> SearchMode {
        match mode.parse::<SearchMode>() {
            Ok(mode) => mode,
            Err(_) => {
                tracing::info!("Unknown search mode '{}', using semantic", mode);
                SearchMode::Semantic
            }
        }
    }

    /// Search in the named mode
    pub async fn search(&self, query: &SearchQuery, mode: &str) -> SearchResult {
        self.search_with_context(query, mode, SearchContext::Internal)
            .await
    }

    /// Search in the named mode, tagging the published event with `context`
    pub async fn search_with_context(
        &self,
        query: &SearchQuery,
        mode: &str,
        context: SearchContext,
    ) -> SearchResult {
        let (result, fell_back) = match Self::resolve_mode(mode) {
            SearchMode::Semantic => match self.semantic.search(query).await {
                Ok(result) => (result, false),
                Err(e) => {
                    tracing::warn!(
                        "Semantic search failed for '{}', falling back to keyword search: {}",
                        query.text(),
                        e
                    );
                    (self.keyword_or_empty(query).await, true)
                }
            },
            SearchMode::Keyword => (self.keyword_or_empty(query).await, false),
        };

        self.record(query, &result, fell_back, context).await;
        result
    }

    /// Recommendations for a product; empty when they cannot be computed
    pub async fn similar_products(&self, product_id: &ProductId, limit: usize) -> SearchResult {
        match self.semantic.find_similar(product_id, limit).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Similar products unavailable for {}: {}", product_id, e);
                SearchResult::empty(SearchMode::Semantic)
            }
        }
    }

    async fn keyword_or_empty(&self, query: &SearchQuery) -> SearchResult {
        match self.keyword.search(query).await {
            Ok(result) => result.with_mode(SearchMode::Keyword),
            Err(e) => {
                tracing::error!("Keyword search failed for '{}': {}", query.text(), e);
                SearchResult::empty(SearchMode::Keyword)
            }
        }
    }

    async fn record(
        &self,
        query: &SearchQuery,
        result: &SearchResult,
        fell_back: bool,
        context: SearchContext,
    ) {
        if let Some(metrics) = &self.metrics {
            if let Err(e) = metrics
                .record_search(
                    result.mode(),
                    result.execution_time_ms(),
                    result.products().len(),
                )
                .await
            {
                tracing::warn!("Failed to record search metrics: {}", e);
            }
        }

        if let Some(publisher) = &self.publisher {
            let event = SearchEvent {
                query: query.text().to_string(),
                mode: result.mode(),
                result_count: result.products().len(),
                execution_time_ms: result.execution_time_ms(),
                fell_back,
                context,
                occurred_at: Utc::now(),
            };
            if let Err(e) = publisher.publish(event).await {
                tracing::warn!("Failed to publish search event: {}", e);
            }
        }
    }
}
