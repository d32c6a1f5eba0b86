//! Fakes and fixtures shared by unit and integration tests
//!
//! Everything here is deterministic and in-process: product fixtures, an embedding client
//! that counts and can be told to fail or stall, a vector store that returns scripted hits
//! while recording what it was asked, and recording side-channel sinks.

use crate::embedding::{EmbeddingClient, HashingEmbeddingClient};
use crate::error::{Result, SearchError};
use crate::search::{SearchEvent, SearchEventPublisher};
use crate::sync::{
    Alert, AlertNotifier, DeadLetterRegistry, FailedSyncJob, InMemoryDeadLetterRegistry,
    JobStatus,
};
use crate::types::{
    DocumentMetadata, Product, ProductEmbeddingDocument, ProductId, EMBEDDING_DIMENSIONS,
};
use crate::vector_store::{InMemoryVectorStore, VectorHit, VectorStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ulid::Ulid;

/// Product with a fixed timestamp, generic name and "Electronics" category
pub fn product(id: &str) -> Product {
    product_with(id, &format!("Product {id}"), "A product", "Electronics")
}

/// Product in a given category
pub fn product_in(id: &str, category: &str) -> Product {
    product_with(id, &format!("Product {id}"), "A product", category)
}

/// Fully specified product
pub fn product_with(id: &str, name: &str, description: &str, category: &str) -> Product {
    let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().unwrap_or_default();
    Product {
        id: ProductId::from(id),
        name: name.to_string(),
        description: description.to_string(),
        category: Some(category.to_string()),
        price_cents: 9_999,
        currency: "USD".to_string(),
        stock: 10,
        created_at: timestamp,
        updated_at: timestamp,
    }
}

/// Unit vector along one axis
pub fn axis_vector(index: usize) -> Vec<f32> {
    let mut vector = vec![0.0; EMBEDDING_DIMENSIONS];
    vector[index % EMBEDDING_DIMENSIONS] = 1.0;
    vector
}

/// Vector store hit for a product with the given similarity
pub fn hit(product_id: &str, similarity: f32) -> VectorHit {
    let product = product(product_id);
    VectorHit {
        product_id: product.id.clone(),
        similarity,
        document: ProductEmbeddingDocument {
            product_id: product.id,
            embedding: axis_vector(0),
            name: product.name,
            description: product.description,
            category: product.category,
            metadata: DocumentMetadata {
                price_cents: product.price_cents,
                currency: product.currency,
                stock: product.stock,
                created_at: product.created_at,
                updated_at: product.updated_at,
            },
        },
    }
}

/// Embedding client that counts calls and can be scripted to fail or stall
#[derive(Debug, Default)]
pub struct CountingEmbeddingClient {
    inner: HashingEmbeddingClient,
    fixed: Option<Vec<f32>>,
    failing: AtomicBool,
    failures_remaining: AtomicUsize,
    delay: Option<Duration>,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl CountingEmbeddingClient {
    /// Client delegating to the hashing model
    pub fn new() -> Self {
        Self::default()
    }

    /// Client returning `vector` for every text
    pub fn fixed(vector: Vec<f32>) -> Self {
        Self {
            fixed: Some(vector),
            ..Self::default()
        }
    }

    /// Client failing every call until told otherwise
    pub fn failing() -> Self {
        let client = Self::default();
        client.set_failing(true);
        client
    }

    /// Client failing its first `count` calls
    pub fn failing_times(count: usize) -> Self {
        let client = Self::default();
        client.failures_remaining.store(count, Ordering::SeqCst);
        client
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Switch permanent failure on or off
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts received, in call order
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmbeddingClient for CountingEmbeddingClient {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted_failure = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || self.failing.load(Ordering::SeqCst) {
            return Err(SearchError::EmbeddingGeneration(
                "provider returned 503".to_string(),
            ));
        }

        match &self.fixed {
            Some(vector) => Ok(vector.clone()),
            None => self.inner.embed(text),
        }
    }

    fn model_id(&self) -> &str {
        "counting-test-model"
    }
}

/// Arguments of one `search_similar` call
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityCall {
    /// Query vector
    pub embedding: Vec<f32>,
    /// Requested number of hits
    pub limit: usize,
    /// Requested threshold
    pub min_similarity: f32,
}

/// Vector store answering searches with scripted hits and recording every call
///
/// Document reads and writes go to an inner [`InMemoryVectorStore`].
#[derive(Debug, Default)]
pub struct ScriptedVectorStore {
    documents: InMemoryVectorStore,
    hits: Mutex<Vec<VectorHit>>,
    calls: Mutex<Vec<SimilarityCall>>,
    failing: AtomicBool,
}

impl ScriptedVectorStore {
    /// Store answering every search with `hits`
    pub fn with_hits(hits: Vec<VectorHit>) -> Self {
        Self {
            hits: Mutex::new(hits),
            ..Self::default()
        }
    }

    /// Switch failure of every operation on or off
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
        self.documents.set_unavailable(failing);
    }

    /// Searches received so far
    pub fn calls(&self) -> Vec<SimilarityCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for ScriptedVectorStore {
    async fn upsert(&self, document: ProductEmbeddingDocument) -> Result<()> {
        self.documents.upsert(document).await
    }

    async fn delete(&self, product_id: &ProductId) -> Result<bool> {
        self.documents.delete(product_id).await
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<ProductEmbeddingDocument>> {
        self.documents.get(product_id).await
    }

    async fn search_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<VectorHit>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SimilarityCall {
                embedding: embedding.to_vec(),
                limit,
                min_similarity,
            });
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SearchError::VectorStore("connection refused".to_string()));
        }
        let mut hits = self.hits.lock().map(|h| h.clone()).unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Alert notifier keeping every alert it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingAlertNotifier {
    alerts: Arc<Mutex<Vec<Alert>>>,
    fail: bool,
}

impl RecordingAlertNotifier {
    /// Notifier that records the alert and then reports a delivery failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Alerts received so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AlertNotifier for RecordingAlertNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
        if self.fail {
            return Err(unreachable("pager unreachable"));
        }
        Ok(())
    }
}

fn unreachable(what: &str) -> SearchError {
    SearchError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        what.to_string(),
    ))
}

/// Event publisher keeping every event it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<SearchEvent>>>,
    fail: bool,
}

impl RecordingEventPublisher {
    /// Publisher that records the event and then reports a delivery failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Events received so far
    pub fn events(&self) -> Vec<SearchEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchEventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: SearchEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        if self.fail {
            return Err(unreachable("event bus unreachable"));
        }
        Ok(())
    }
}

/// Dead-letter registry whose outcome writes can be made to fail per job
///
/// Reads, claims and new failures always go through to the wrapped registry, so tests can
/// inspect the state a failed write leaves behind through [`Self::inner`].
#[derive(Debug, Clone, Default)]
pub struct FlakyDeadLetterRegistry {
    inner: InMemoryDeadLetterRegistry,
    failing_jobs: Arc<Mutex<HashSet<Ulid>>>,
    release_failing: Arc<AtomicBool>,
}

impl FlakyDeadLetterRegistry {
    /// The wrapped registry; clones share its jobs
    pub fn inner(&self) -> &InMemoryDeadLetterRegistry {
        &self.inner
    }

    /// Make resolving or rescheduling `id` fail
    pub fn fail_writes_for(&self, id: Ulid) {
        if let Ok(mut jobs) = self.failing_jobs.lock() {
            jobs.insert(id);
        }
    }

    /// Make [`DeadLetterRegistry::release`] fail
    pub fn set_release_failing(&self, failing: bool) {
        self.release_failing.store(failing, Ordering::SeqCst);
    }

    /// Let every write through again
    pub fn heal(&self) {
        if let Ok(mut jobs) = self.failing_jobs.lock() {
            jobs.clear();
        }
        self.set_release_failing(false);
    }

    fn check_write(&self, id: Ulid) -> Result<()> {
        let failing = self
            .failing_jobs
            .lock()
            .map(|jobs| jobs.contains(&id))
            .unwrap_or(false);
        if failing {
            return Err(SearchError::Storage(format!("write of job {id} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl DeadLetterRegistry for FlakyDeadLetterRegistry {
    async fn record_failure(&self, job: FailedSyncJob) -> Result<()> {
        self.inner.record_failure(job).await
    }

    async fn get_jobs_ready_for_retry(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<FailedSyncJob>> {
        self.inner.get_jobs_ready_for_retry(limit, now).await
    }

    async fn mark_as_retrying(&self, id: Ulid, now: DateTime<Utc>) -> Result<()> {
        self.inner.mark_as_retrying(id, now).await
    }

    async fn release(&self, id: Ulid) -> Result<()> {
        if self.release_failing.load(Ordering::SeqCst) {
            return Err(SearchError::Storage(format!("release of job {id} rejected")));
        }
        self.inner.release(id).await
    }

    async fn mark_as_resolved(&self, id: Ulid, now: DateTime<Utc>) -> Result<()> {
        self.check_write(id)?;
        self.inner.mark_as_resolved(id, now).await
    }

    async fn update_after_retry_failure(
        &self,
        id: Ulid,
        error: &SearchError,
        now: DateTime<Utc>,
    ) -> Result<FailedSyncJob> {
        self.check_write(id)?;
        self.inner.update_after_retry_failure(id, error, now).await
    }

    async fn get(&self, id: Ulid) -> Result<Option<FailedSyncJob>> {
        self.inner.get(id).await
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<FailedSyncJob>> {
        self.inner.list_by_status(status).await
    }

    async fn purge_resolved(&self, older_than: DateTime<Utc>) -> Result<usize> {
        self.inner.purge_resolved(older_than).await
    }
}
