//! Brute-force in-memory [`VectorStore`]

use super::{cosine_similarity, VectorHit, VectorStore};
use crate::error::{Result, SearchError};
use crate::types::{validate_dimensions, ProductEmbeddingDocument, ProductId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Concurrent in-memory vector store scanning every document per query
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    documents: Arc<DashMap<ProductId, ProductEmbeddingDocument>>,
    unavailable: Arc<AtomicBool>,
    search_calls: Arc<AtomicUsize>,
}

impl InMemoryVectorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails with a vector store error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// How many similarity searches have been served
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SearchError::VectorStore(
                "vector store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, document: ProductEmbeddingDocument) -> Result<()> {
        self.check_available()?;
        validate_dimensions(&document.embedding)
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;
        self.documents.insert(document.product_id.clone(), document);
        Ok(())
    }

    async fn delete(&self, product_id: &ProductId) -> Result<bool> {
        self.check_available()?;
        Ok(self.documents.remove(product_id).is_some())
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<ProductEmbeddingDocument>> {
        self.check_available()?;
        Ok(self.documents.get(product_id).map(|d| d.clone()))
    }

    async fn search_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<VectorHit>> {
        self.check_available()?;
        validate_dimensions(embedding).map_err(|e| SearchError::VectorStore(e.to_string()))?;
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let mut hits: Vec<VectorHit> = self
            .documents
            .iter()
            .filter_map(|entry| {
                let similarity = cosine_similarity(embedding, &entry.embedding);
                (similarity >= min_similarity).then(|| VectorHit {
                    product_id: entry.key().clone(),
                    similarity,
                    document: entry.value().clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
