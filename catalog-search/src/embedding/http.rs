//! Embedding client for OpenAI-compatible `/embeddings` endpoints

use super::EmbeddingClient;
use crate::common::{retry_linear, RetryPolicy};
use crate::error::{Result, SearchError};
use crate::types::EMBEDDING_DIMENSIONS;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Settings for [`HttpEmbeddingClient`]
#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_key: String,
    /// Model name sent in the request body
    pub model: String,
    /// Deadline for one HTTP round trip
    pub timeout: Duration,
    /// Immediate retries for rate limits and server errors
    pub retry: RetryPolicy,
}

impl Default for HttpEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug)]
struct ProviderFailure {
    message: String,
    retryable: bool,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Async embeddings client with bearer auth, per-request deadline and bounded retries
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

impl fmt::Debug for HttpEmbeddingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEmbeddingClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpEmbeddingClient {
    /// Build a client; fails on a missing API key or model
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(SearchError::Config(
                "embedding API key is not configured".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(SearchError::Config(
                "embedding model is not configured".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|e| SearchError::Config(format!("invalid embedding API key: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SearchError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model,
            retry: config.retry,
        })
    }

    /// Full URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request_once(&self, text: &str) -> std::result::Result<String, ProviderFailure> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: EMBEDDING_DIMENSIONS,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderFailure {
                retryable: e.is_timeout() || e.is_connect() || e.is_request(),
                message: format!("embedding request failed: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderFailure {
            retryable: true,
            message: format!("failed to read embedding response: {e}"),
        })?;

        if !status.is_success() {
            return Err(ProviderFailure {
                retryable: should_retry(status),
                message: format!("embedding provider returned {status}: {body}"),
            });
        }
        Ok(body)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Extract and validate the first embedding from a provider response body
pub(crate) fn parse_embedding_response(body: &str) -> Result<Vec<f32>> {
    let parsed: EmbeddingResponse = serde_json::from_str(body).map_err(|e| {
        SearchError::EmbeddingGeneration(format!("malformed embedding response: {e}"))
    })?;
    let embedding = parsed
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| {
            SearchError::EmbeddingGeneration("embedding response contained no data".to_string())
        })?;

    if embedding.len() != EMBEDDING_DIMENSIONS {
        return Err(SearchError::EmbeddingGeneration(format!(
            "provider returned {} dimensions, expected {}",
            embedding.len(),
            EMBEDDING_DIMENSIONS
        )));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(SearchError::EmbeddingGeneration(
            "provider returned non-finite values".to_string(),
        ));
    }
    Ok(embedding)
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::Validation(
                "cannot embed empty text".to_string(),
            ));
        }

        let body = retry_linear(
            self.retry,
            |failure: &ProviderFailure| failure.retryable,
            |_| self.request_once(text),
        )
        .await
        .map_err(|failure| SearchError::EmbeddingGeneration(failure.message))?;

        let embedding = parse_embedding_response(&body)?;
        tracing::debug!(
            "Generated {}-dimensional embedding with {}",
            embedding.len(),
            self.model
        );
        Ok(embedding)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
