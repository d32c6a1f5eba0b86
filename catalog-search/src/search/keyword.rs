//! Case-insensitive substring search over the product repository
//!
//! This is the fallback path when semantic search is unavailable, so it depends on
//! nothing but the relational store.

use crate::error::Result;
use crate::products::ProductRepository;
use crate::types::{Product, SearchMode, SearchQuery, SearchResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Keyword search engine
pub struct KeywordSearchEngine {
    products: Arc<dyn ProductRepository>,
}

impl KeywordSearchEngine {
    /// Engine over `products`
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    /// Match the query text against product names and descriptions
    ///
    /// Name matches rank ahead of description-only matches. `total_results` counts every
    /// match before paging; keyword results carry no scores.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let started = Instant::now();
        let needle = query.text().trim().to_lowercase();
        if needle.is_empty() {
            return Ok(SearchResult::empty(SearchMode::Keyword));
        }

        let (mut by_name, by_description): (Vec<Product>, Vec<Product>) = self
            .products
            .find_all()
            .await?
            .into_iter()
            .filter(|p| query.category().map(|c| p.in_category(c)).unwrap_or(true))
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.description.to_lowercase().contains(&needle)
            })
            .partition(|p| p.name.to_lowercase().contains(&needle));
        by_name.extend(by_description);

        let total = by_name.len();
        let products: Vec<Product> = by_name
            .into_iter()
            .skip(query.offset())
            .take(query.effective_limit())
            .collect();

        Ok(SearchResult::new(
            products,
            HashMap::new(),
            SearchMode::Keyword,
            total,
            started.elapsed().as_secs_f64() * 1000.0,
        ))
    }
}
