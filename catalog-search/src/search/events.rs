//! Search analytics events
//!
//! Publishing is a side channel: the router logs and drops publisher errors.

use crate::error::Result;
use crate::types::SearchMode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a search originated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchContext {
    /// Storefront search box
    Storefront {
        /// Anonymous session, if known
        session_id: Option<String>,
    },
    /// Tool call made by the shopping assistant
    Assistant {
        /// Conversation the tool call belongs to
        conversation_id: String,
    },
    /// Command line or other internal caller
    #[default]
    Internal,
}

/// One completed search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    /// Query text as submitted
    pub query: String,
    /// Mode that produced the result
    pub mode: SearchMode,
    /// Products returned
    pub result_count: usize,
    /// Wall-clock time spent searching
    pub execution_time_ms: f64,
    /// Whether semantic search failed and keyword search answered instead
    pub fell_back: bool,
    /// Origin of the search
    pub context: SearchContext,
    /// Completion time
    pub occurred_at: DateTime<Utc>,
}

/// Sink for search events
#[async_trait]
pub trait SearchEventPublisher: Send + Sync {
    /// Deliver one event
    async fn publish(&self, event: SearchEvent) -> Result<()>;
}

/// Publisher that writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher;

#[async_trait]
impl SearchEventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: SearchEvent) -> Result<()> {
        tracing::debug!(
            query = %event.query,
            mode = %event.mode,
            results = event.result_count,
            elapsed_ms = event.execution_time_ms,
            fell_back = event.fell_back,
            "search completed"
        );
        Ok(())
    }
}
