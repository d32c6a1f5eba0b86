//! Embedding generation, caching and canonical product text
//!
//! [`EmbeddingClient`] is the seam to the external embedding provider. Two
//! implementations ship with the crate: [`HttpEmbeddingClient`] for OpenAI-compatible
//! endpoints and [`HashingEmbeddingClient`], a deterministic local model used offline
//! and in tests.

use crate::error::Result;
use async_trait::async_trait;

pub mod cache;
pub mod hashing;
pub mod http;
pub mod text_builder;

pub use cache::{CacheStats, EmbeddingCache, CACHE_KEY_PREFIX};
pub use hashing::HashingEmbeddingClient;
pub use http::{HttpEmbeddingClient, HttpEmbeddingConfig};
pub use text_builder::{EmbeddingTextBuilder, TextBuilderConfig};

/// Produces fixed-dimension embedding vectors for text
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed `text`, failing with [`crate::SearchError::EmbeddingGeneration`] on provider
    /// errors or malformed responses
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifier of the model behind this client
    fn model_id(&self) -> &str;
}
