//! Vector store seam
//!
//! Documents are keyed by product id and replaced wholesale on upsert. Similarity is
//! cosine similarity over [`crate::types::EMBEDDING_DIMENSIONS`]-sized vectors.

use crate::error::Result;
use crate::types::{ProductEmbeddingDocument, ProductId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::InMemoryVectorStore;

/// One similarity match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    /// Product the matched document belongs to
    pub product_id: ProductId,
    /// Cosine similarity to the query vector
    pub similarity: f32,
    /// The matched document
    pub document: ProductEmbeddingDocument,
}

/// Storage and similarity search for product embedding documents
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the document for its product
    async fn upsert(&self, document: ProductEmbeddingDocument) -> Result<()>;

    /// Remove a product's document, returning whether one existed
    async fn delete(&self, product_id: &ProductId) -> Result<bool>;

    /// Fetch a product's document
    async fn get(&self, product_id: &ProductId) -> Result<Option<ProductEmbeddingDocument>>;

    /// Up to `limit` documents with similarity >= `min_similarity`, most similar first
    async fn search_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<VectorHit>>;
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
