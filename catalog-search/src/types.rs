//! Core data structures shared by the search and sync pipelines

use crate::error::{Result, SearchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Dimensionality of every embedding vector accepted by the cache and the vector store
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Hard maximum on results per search call, applied regardless of the requested limit
pub const MAX_SEARCH_LIMIT: usize = 50;

/// Deepest page semantic search will fetch; larger offsets read as an empty page
pub const MAX_SEARCH_OFFSET: usize = 10_000;

/// Default minimum similarity for catalog search
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.3;

/// Reject any vector that does not have exactly [`EMBEDDING_DIMENSIONS`] entries
pub fn validate_dimensions(vector: &[f32]) -> Result<()> {
    if vector.len() != EMBEDDING_DIMENSIONS {
        return Err(SearchError::Validation(format!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            EMBEDDING_DIMENSIONS
        )));
    }
    Ok(())
}

/// Stable external product identifier shared by the relational store and the vector store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    /// Create a product id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Authoritative product record owned by the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Stable external identifier
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Free-form description, may contain markup
    #[serde(default)]
    pub description: String,
    /// Category name, if the product is categorized
    #[serde(default)]
    pub category: Option<String>,
    /// Price in minor currency units
    pub price_cents: i64,
    /// ISO currency code
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Units in stock
    #[serde(default)]
    pub stock: i64,
    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Product {
    /// Case-insensitive category comparison
    pub fn in_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(category.trim()))
            .unwrap_or(false)
    }
}

/// Relational fields copied onto the vector store document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Price in minor currency units
    pub price_cents: i64,
    /// ISO currency code
    pub currency: String,
    /// Units in stock
    pub stock: i64,
    /// Product creation timestamp
    pub created_at: DateTime<Utc>,
    /// Product modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Vector store document for one product, replaced wholesale on every update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEmbeddingDocument {
    /// Stable product identifier
    pub product_id: ProductId,
    /// Embedding of the product's canonical text
    pub embedding: Vec<f32>,
    /// Product name at sync time
    pub name: String,
    /// Product description at sync time
    pub description: String,
    /// Category at sync time
    pub category: Option<String>,
    /// Relational metadata at sync time
    pub metadata: DocumentMetadata,
}

impl ProductEmbeddingDocument {
    /// Build a document from a product and its embedding, rejecting wrong-sized vectors
    pub fn from_product(product: &Product, embedding: Vec<f32>) -> Result<Self> {
        validate_dimensions(&embedding)?;
        Ok(Self {
            product_id: product.id.clone(),
            embedding,
            name: product.name.clone(),
            description: product.description.clone(),
            category: product.category.clone(),
            metadata: DocumentMetadata {
                price_cents: product.price_cents,
                currency: product.currency.clone(),
                stock: product.stock,
                created_at: product.created_at,
                updated_at: product.updated_at,
            },
        })
    }
}

/// How a search result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Vector similarity search
    Semantic,
    /// Substring search over the relational store
    Keyword,
}

impl SearchMode {
    /// Stable lowercase name used in metric keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Semantic => "semantic",
            SearchMode::Keyword => "keyword",
        }
    }

    /// Every mode, in reporting order
    pub fn all() -> [SearchMode; 2] {
        [SearchMode::Semantic, SearchMode::Keyword]
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(SearchMode::Semantic),
            "keyword" => Ok(SearchMode::Keyword),
            other => Err(SearchError::Validation(format!("unknown search mode '{other}'"))),
        }
    }
}

/// Search request parameters
///
/// The requested limit is kept as given; [`SearchQuery::effective_limit`] applies the
/// server-side ceiling so callers can tell when clamping happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SearchQueryFields")]
pub struct SearchQuery {
    text: String,
    limit: usize,
    offset: usize,
    min_similarity: f32,
    category: Option<String>,
}

/// Wire form of [`SearchQuery`]; deserialization goes through the builders
#[derive(Deserialize)]
struct SearchQueryFields {
    text: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_min_similarity")]
    min_similarity: f32,
    #[serde(default)]
    category: Option<String>,
}

fn default_limit() -> usize {
    10
}

fn default_min_similarity() -> f32 {
    DEFAULT_MIN_SIMILARITY
}

impl From<SearchQueryFields> for SearchQuery {
    fn from(fields: SearchQueryFields) -> Self {
        let query = SearchQuery::new(fields.text)
            .with_limit(fields.limit)
            .with_offset(fields.offset)
            .with_min_similarity(fields.min_similarity);
        match fields.category {
            Some(category) => query.with_category(category),
            None => query,
        }
    }
}

impl SearchQuery {
    /// Create a query with default paging (limit 10, offset 0) and similarity threshold
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: default_limit(),
            offset: 0,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            category: None,
        }
    }

    /// Set the requested result limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the pagination offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Set the minimum similarity, clamped to `[0, 1]`
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = if min_similarity.is_nan() {
            DEFAULT_MIN_SIMILARITY
        } else {
            min_similarity.clamp(0.0, 1.0)
        };
        self
    }

    /// Restrict results to one category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.category = if category.trim().is_empty() {
            None
        } else {
            Some(category)
        };
        self
    }

    /// Query text as submitted
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Limit as requested by the caller
    pub fn requested_limit(&self) -> usize {
        self.limit
    }

    /// Limit after applying the `1..=MAX_SEARCH_LIMIT` bounds
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_SEARCH_LIMIT)
    }

    /// Pagination offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Minimum similarity score for vector hits
    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    /// Optional category filter
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }
}

/// Outcome of one search call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    products: Vec<Product>,
    scores: HashMap<ProductId, f32>,
    mode: SearchMode,
    total_results: usize,
    execution_time_ms: f64,
}

impl SearchResult {
    /// Assemble a result
    pub fn new(
        products: Vec<Product>,
        scores: HashMap<ProductId, f32>,
        mode: SearchMode,
        total_results: usize,
        execution_time_ms: f64,
    ) -> Self {
        Self {
            products,
            scores,
            mode,
            total_results,
            execution_time_ms,
        }
    }

    /// An empty result for the given mode
    pub fn empty(mode: SearchMode) -> Self {
        Self::new(Vec::new(), HashMap::new(), mode, 0, 0.0)
    }

    /// The same result relabelled with another mode
    pub fn with_mode(self, mode: SearchMode) -> Self {
        Self { mode, ..self }
    }

    /// Matching products in rank order
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Similarity score per product (empty for keyword results)
    pub fn scores(&self) -> &HashMap<ProductId, f32> {
        &self.scores
    }

    /// Score for one product, if it has one
    pub fn score_for(&self, id: &ProductId) -> Option<f32> {
        self.scores.get(id).copied()
    }

    /// Mode that produced the result
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Number of matches reported by the engine
    pub fn total_results(&self) -> usize {
        self.total_results
    }

    /// Wall-clock time spent producing the result
    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time_ms
    }

    /// Whether no product matched
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
