//! Unified error handling for the catalog search library
//!
//! Errors are split by how callers are expected to react to them:
//!
//! - [`SearchError::Validation`] is bad input and is surfaced as-is, never retried.
//! - [`SearchError::EmbeddingGeneration`], [`SearchError::VectorStore`] and
//!   [`SearchError::Timeout`] are transient external failures. The search facade turns
//!   them into a keyword fallback and the sync orchestrator turns them into dead-letter
//!   jobs.
//! - [`SearchError::Cache`] is always swallowed by the embedding cache.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the catalog search library
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SearchError {
    /// Input rejected before any external call was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// The embedding provider failed, timed out or returned a malformed response
    #[error("Embedding generation failed: {0}")]
    EmbeddingGeneration(String),

    /// The vector store rejected or failed an operation
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// The key-value cache backend failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Semantic search could not produce a result; callers fall back to keyword search
    #[error("Semantic search unavailable: {source}")]
    SearchUnavailable {
        /// The embedding or vector store failure that made search unavailable
        #[source]
        source: Box<SearchError>,
    },

    /// An external call exceeded its deadline
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// The deadline that was exceeded
        duration: Duration,
    },

    /// Persistence collaborator error (product repository, dead-letter registry)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{message}")]
    Context {
        /// Description of what was being attempted
        message: String,
        /// Underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SearchError {
    /// Wrap an embedding or vector store failure as a search-unavailable error
    pub fn unavailable(source: SearchError) -> Self {
        match source {
            already @ SearchError::SearchUnavailable { .. } => already,
            other => SearchError::SearchUnavailable {
                source: Box::new(other),
            },
        }
    }

    /// Whether this error is a transient external failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::EmbeddingGeneration(_)
            | SearchError::VectorStore(_)
            | SearchError::Cache(_)
            | SearchError::Timeout { .. }
            | SearchError::Storage(_) => true,
            SearchError::SearchUnavailable { source } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for catalog search operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, msg: S) -> Result<T>;

    /// Add context with a closure that's only called on error
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<S: Into<String>>(self, msg: S) -> Result<T> {
        self.map_err(|e| SearchError::Context {
            message: msg.into(),
            source: Box::new(e),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| SearchError::Context {
            message: f().into(),
            source: Box::new(e),
        })
    }
}

/// Error chain formatter for detailed error reporting
pub struct ErrorChain<'a>(&'a dyn std::error::Error);

impl<'a> fmt::Display for ErrorChain<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.0)?;

        let mut current = self.0.source();
        let mut level = 1;

        while let Some(err) = current {
            writeln!(f, "{:indent$}Caused by: {}", "", err, indent = level * 2)?;
            current = err.source();
            level += 1;
        }

        Ok(())
    }
}

/// Extension trait for error types to format the full error chain
pub trait ErrorChainExt {
    /// Format the full error chain
    fn error_chain(&self) -> ErrorChain<'_>;
}

impl<E: std::error::Error> ErrorChainExt for E {
    fn error_chain(&self) -> ErrorChain<'_> {
        ErrorChain(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_context() {
        let err: Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "catalog missing").into());
        let err_with_context = err.context("Failed to open product catalog");

        assert!(err_with_context.is_err());
        let msg = err_with_context.unwrap_err().to_string();
        assert!(msg.contains("Failed to open product catalog"));
    }

    #[test]
    fn test_error_chain_display() {
        let err = SearchError::unavailable(SearchError::EmbeddingGeneration(
            "provider returned 503".to_string(),
        ));

        let chain = err.error_chain().to_string();
        assert!(chain.contains("Semantic search unavailable"));
        assert!(chain.contains("provider returned 503"));
    }

    #[test]
    fn test_unavailable_does_not_nest() {
        let inner = SearchError::unavailable(SearchError::VectorStore("down".to_string()));
        let outer = SearchError::unavailable(inner);

        match outer {
            SearchError::SearchUnavailable { source } => {
                assert!(matches!(*source, SearchError::VectorStore(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(SearchError::EmbeddingGeneration("x".into()).is_transient());
        assert!(SearchError::Timeout {
            operation: "vector search".into(),
            duration: Duration::from_secs(2),
        }
        .is_transient());
        assert!(!SearchError::Validation("too long".into()).is_transient());
    }
}
