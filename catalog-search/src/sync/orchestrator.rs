//! Mirrors product mutations into the vector store
//!
//! [`EmbeddingSyncOrchestrator::handle`] is what product writes call: it never fails,
//! so a sync problem can never roll back or block the mutation itself. The raw
//! [`EmbeddingSyncOrchestrator::sync`] is what retries replay.

use super::dead_letter::{DeadLetterRegistry, FailedSyncJob};
use super::monitor::FailureRateMonitor;
use super::ProductEvent;
use crate::common::with_timeout;
use crate::config::SearchConfig;
use crate::embedding::{EmbeddingClient, EmbeddingTextBuilder};
use crate::error::{Result, SearchError};
use crate::types::{Product, ProductEmbeddingDocument};
use crate::vector_store::VectorStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// Result of handling one product event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The vector store reflects the event
    Synced,
    /// The sync failed and was handed to the dead-letter registry
    Failed {
        /// Dead-letter job id, absent when the registry could not record it either
        job_id: Option<Ulid>,
        /// What went wrong
        error: String,
    },
}

impl SyncOutcome {
    /// Whether the sync went through
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced)
    }
}

/// Totals of a bulk reindex
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Products indexed
    pub synced: usize,
    /// Products that failed
    pub failed: usize,
    /// Dead-letter jobs created for the failures
    pub dead_letter_jobs: Vec<Ulid>,
}

/// Embedding sync pipeline
pub struct EmbeddingSyncOrchestrator {
    text_builder: EmbeddingTextBuilder,
    embedder: Arc<dyn EmbeddingClient>,
    vector_store: Arc<dyn VectorStore>,
    dead_letters: Arc<dyn DeadLetterRegistry>,
    monitor: Arc<FailureRateMonitor>,
    embedding_timeout: Duration,
    vector_store_timeout: Duration,
}

impl EmbeddingSyncOrchestrator {
    /// Wire an orchestrator to its collaborators
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        vector_store: Arc<dyn VectorStore>,
        dead_letters: Arc<dyn DeadLetterRegistry>,
        monitor: Arc<FailureRateMonitor>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            text_builder: EmbeddingTextBuilder::new(),
            embedder,
            vector_store,
            dead_letters,
            monitor,
            embedding_timeout: config.embedding_timeout(),
            vector_store_timeout: config.vector_store_timeout(),
        }
    }

    /// Replace the text builder
    pub fn with_text_builder(mut self, text_builder: EmbeddingTextBuilder) -> Self {
        self.text_builder = text_builder;
        self
    }

    /// Failure-rate monitor fed by this orchestrator
    pub fn monitor(&self) -> &Arc<FailureRateMonitor> {
        &self.monitor
    }

    /// Apply an event, turning any failure into a dead-letter job
    pub async fn handle(&self, event: ProductEvent) -> SyncOutcome {
        self.handle_at(event, Utc::now()).await
    }

    /// [`Self::handle`] with an explicit clock
    pub async fn handle_at(&self, event: ProductEvent, now: DateTime<Utc>) -> SyncOutcome {
        match self.sync(&event).await {
            Ok(()) => {
                tracing::info!(
                    "Synced {} of product {}",
                    event.operation(),
                    event.product_id()
                );
                self.record_success().await;
                SyncOutcome::Synced
            }
            Err(error) => {
                tracing::warn!(
                    "Embedding sync failed for {} of product {}: {}",
                    event.operation(),
                    event.product_id(),
                    error
                );
                let job = FailedSyncJob::first_failure(&event, &error, now);
                let job_id = job.id;
                let job_id = match self.dead_letters.record_failure(job).await {
                    Ok(()) => Some(job_id),
                    Err(e) => {
                        tracing::error!(
                            "Could not record dead-letter job for product {}: {}",
                            event.product_id(),
                            e
                        );
                        None
                    }
                };
                self.record_failure(now).await;
                SyncOutcome::Failed {
                    job_id,
                    error: error.to_string(),
                }
            }
        }
    }

    /// Apply an event, returning the failure to the caller
    pub async fn sync(&self, event: &ProductEvent) -> Result<()> {
        match event {
            ProductEvent::Created { product } | ProductEvent::Updated { product } => {
                self.upsert(product).await
            }
            ProductEvent::Deleted { product_id } => {
                let existed = with_timeout(
                    "vector delete",
                    self.vector_store_timeout,
                    self.vector_store.delete(product_id),
                )
                .await?;
                if !existed {
                    tracing::debug!("Product {} had no stored embedding", product_id);
                }
                Ok(())
            }
        }
    }

    /// Replay an event for a retry and feed the outcome to the monitor
    pub async fn replay(&self, event: &ProductEvent, now: DateTime<Utc>) -> Result<()> {
        let result = self.sync(event).await;
        match &result {
            Ok(()) => self.record_success().await,
            Err(_) => self.record_failure(now).await,
        }
        result
    }

    /// Index every product, as updates
    pub async fn sync_all(&self, products: impl IntoIterator<Item = Product>) -> SyncReport {
        let mut report = SyncReport::default();
        for product in products {
            match self.handle(ProductEvent::updated(product)).await {
                SyncOutcome::Synced => report.synced += 1,
                SyncOutcome::Failed { job_id, .. } => {
                    report.failed += 1;
                    report.dead_letter_jobs.extend(job_id);
                }
            }
        }
        tracing::info!(
            "Reindex finished: {} synced, {} failed",
            report.synced,
            report.failed
        );
        report
    }

    async fn upsert(&self, product: &Product) -> Result<()> {
        let text = self.text_builder.build_text(product)?;
        let embedding = with_timeout(
            "embedding generation",
            self.embedding_timeout,
            self.embedder.generate_embedding(&text),
        )
        .await?;
        let document = ProductEmbeddingDocument::from_product(product, embedding)
            .map_err(|e| SearchError::EmbeddingGeneration(e.to_string()))?;
        with_timeout(
            "vector upsert",
            self.vector_store_timeout,
            self.vector_store.upsert(document),
        )
        .await
    }

    async fn record_success(&self) {
        if let Err(e) = self.monitor.record_success().await {
            tracing::warn!("Failed to record sync success: {}", e);
        }
    }

    async fn record_failure(&self, now: DateTime<Utc>) {
        if let Err(e) = self.monitor.record_failure(now).await {
            tracing::warn!("Failed to record sync failure: {}", e);
        }
    }
}
