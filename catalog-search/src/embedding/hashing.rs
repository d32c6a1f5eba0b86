//! Deterministic local embedding model
//!
//! Every token maps to a pseudo-random unit vector seeded by its hash; a text embeds as
//! the normalized average of its token vectors. Texts that share words land close to
//! each other, which is enough for offline indexing, demos and tests.

use super::EmbeddingClient;
use crate::error::{Result, SearchError};
use crate::types::EMBEDDING_DIMENSIONS;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Model identifier reported by [`HashingEmbeddingClient`]
pub const HASHING_MODEL_ID: &str = "local-hashing-v1";

/// Local embedding client with no external dependencies
///
/// Holds no state, so memory use stays flat however many distinct words it sees.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashingEmbeddingClient;

impl HashingEmbeddingClient {
    /// Create a client
    pub fn new() -> Self {
        Self
    }

    /// Embed synchronously
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(SearchError::EmbeddingGeneration(
                "text has no embeddable tokens".to_string(),
            ));
        }

        let mut embedding = vec![0.0f32; EMBEDDING_DIMENSIONS];
        for token in &tokens {
            for (acc, value) in embedding.iter_mut().zip(word_vector(token)) {
                *acc += value;
            }
        }
        let count = tokens.len() as f32;
        for value in embedding.iter_mut() {
            *value /= count;
        }

        normalize(&mut embedding);
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    fn model_id(&self) -> &str {
        HASHING_MODEL_ID
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn word_vector(word: &str) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    word.hash(&mut hasher);
    let mut state = hasher.finish();

    let mut vector: Vec<f32> = (0..EMBEDDING_DIMENSIONS)
        .map(|_| {
            let bits = splitmix64(&mut state);
            // top 24 bits mapped onto [-1, 1)
            ((bits >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        })
        .collect();
    normalize(&mut vector);
    vector
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}
