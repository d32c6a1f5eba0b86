//! Failed embedding-sync jobs and their retry schedule
//!
//! A job is created on the first failure with one attempt and scheduled along a fixed
//! backoff table. Once a job has used [`MAX_SYNC_ATTEMPTS`] attempts it is abandoned and
//! never picked up again.

use super::{ProductEvent, SyncOperation};
use crate::error::{ErrorChainExt, ErrorContext, Result, SearchError};
use crate::types::ProductId;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use ulid::Ulid;

/// Attempts after which a job is abandoned
pub const MAX_SYNC_ATTEMPTS: u32 = 5;

/// How long a sweep owns a job it picked up; after that another sweep may take it over
pub const RETRY_LEASE_SECONDS: i64 = 900;

/// Delay before the next retry, indexed by attempts made so far
const BACKOFF_SECONDS: [(u32, i64); 5] = [
    (1, 60),
    (2, 300),
    (3, 1_800),
    (4, 7_200),
    (5, 86_400),
];

/// Backoff table entry for `attempts`, if the table has one
pub fn backoff_delay(attempts: u32) -> Option<ChronoDuration> {
    BACKOFF_SECONDS
        .iter()
        .find(|(n, _)| *n == attempts)
        .map(|(_, secs)| ChronoDuration::seconds(*secs))
}

/// When a job with `attempts` failed attempts should next run; `None` means abandon
pub fn calculate_retry_time(attempts: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if attempts >= MAX_SYNC_ATTEMPTS {
        return None;
    }
    backoff_delay(attempts).map(|delay| now + delay)
}

/// Lifecycle of a dead-letter job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for its retry time
    Failed,
    /// Picked up by a sweep
    Retrying,
    /// A retry succeeded
    Resolved,
    /// Out of attempts
    Abandoned,
}

impl JobStatus {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::Resolved => "resolved",
            JobStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "failed" => Ok(JobStatus::Failed),
            "retrying" => Ok(JobStatus::Retrying),
            "resolved" => Ok(JobStatus::Resolved),
            "abandoned" => Ok(JobStatus::Abandoned),
            other => Err(SearchError::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

/// A product mutation whose embedding sync failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSyncJob {
    /// Job identifier
    pub id: Ulid,
    /// Product the sync was for
    pub product_id: ProductId,
    /// Mutation kind
    pub operation: SyncOperation,
    /// Last error message
    pub error_message: String,
    /// Full cause chain of the last error
    pub error_trace: String,
    /// The mutation as it was when it failed, replayed on retry
    pub payload_snapshot: ProductEvent,
    /// Attempts made so far
    pub attempts: u32,
    /// First failure time
    pub failed_at: DateTime<Utc>,
    /// Time of the last retry
    pub last_retry_at: Option<DateTime<Utc>>,
    /// When the sweep currently replaying the job picked it up
    #[serde(default)]
    pub retry_started_at: Option<DateTime<Utc>>,
    /// Earliest time of the next retry; `None` once abandoned or resolved
    pub retry_after: Option<DateTime<Utc>>,
    /// Time the job was resolved
    pub resolved_at: Option<DateTime<Utc>>,
    /// Lifecycle status
    pub status: JobStatus,
}

impl FailedSyncJob {
    /// Job for a first failure: one attempt, scheduled along the backoff table
    pub fn first_failure(event: &ProductEvent, error: &SearchError, now: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new(),
            product_id: event.product_id().clone(),
            operation: event.operation(),
            error_message: error.to_string(),
            error_trace: error.error_chain().to_string(),
            payload_snapshot: event.clone(),
            attempts: 1,
            failed_at: now,
            last_retry_at: None,
            retry_started_at: None,
            retry_after: calculate_retry_time(1, now),
            resolved_at: None,
            status: JobStatus::Failed,
        }
    }

    /// Whether a sweep at `now` should pick this job up
    ///
    /// A job left in `Retrying` by a sweep that never finished becomes ready again once
    /// its lease of [`RETRY_LEASE_SECONDS`] has run out.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        let claimable = match self.status {
            JobStatus::Failed => true,
            JobStatus::Retrying => self
                .retry_started_at
                .map(|at| at + ChronoDuration::seconds(RETRY_LEASE_SECONDS) <= now)
                .unwrap_or(true),
            JobStatus::Resolved | JobStatus::Abandoned => false,
        };
        claimable
            && self.attempts < MAX_SYNC_ATTEMPTS
            && self.retry_after.map(|at| at <= now).unwrap_or(false)
    }
}

/// Persistence for failed sync jobs
#[async_trait]
pub trait DeadLetterRegistry: Send + Sync {
    /// Store a new job
    async fn record_failure(&self, job: FailedSyncJob) -> Result<()>;

    /// Up to `limit` jobs ready at `now`, oldest failure first
    async fn get_jobs_ready_for_retry(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<FailedSyncJob>>;

    /// Flag a job as picked up by a sweep at `now`
    async fn mark_as_retrying(&self, id: Ulid, now: DateTime<Utc>) -> Result<()>;

    /// Hand a picked-up job back to the ready queue, keeping its attempts and retry time
    async fn release(&self, id: Ulid) -> Result<()>;

    /// Flag a job as successfully replayed
    async fn mark_as_resolved(&self, id: Ulid, now: DateTime<Utc>) -> Result<()>;

    /// Count another failed attempt and reschedule or abandon the job
    async fn update_after_retry_failure(
        &self,
        id: Ulid,
        error: &SearchError,
        now: DateTime<Utc>,
    ) -> Result<FailedSyncJob>;

    /// Fetch a job
    async fn get(&self, id: Ulid) -> Result<Option<FailedSyncJob>>;

    /// Every job in `status`, oldest failure first
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<FailedSyncJob>>;

    /// Delete resolved jobs resolved before `older_than`, returning how many were removed
    async fn purge_resolved(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

/// In-memory registry with optional JSON persistence
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterRegistry {
    jobs: Arc<DashMap<Ulid, FailedSyncJob>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryDeadLetterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `jobs`
    pub fn from_jobs(jobs: impl IntoIterator<Item = FailedSyncJob>) -> Self {
        let registry = Self::new();
        for job in jobs {
            registry.jobs.insert(job.id, job);
        }
        registry
    }

    /// Load jobs from a JSON file; a missing file yields an empty registry
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path).context("reading dead-letter jobs")?;
        let jobs: Vec<FailedSyncJob> =
            serde_json::from_str(&content).context("parsing dead-letter jobs")?;
        Ok(Self::from_jobs(jobs))
    }

    /// Write every job to a JSON file, creating parent directories
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("creating dead-letter directory")?;
        }
        let content = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, content).context("writing dead-letter jobs")?;
        Ok(())
    }

    /// Every job, oldest failure first
    pub fn snapshot(&self) -> Vec<FailedSyncJob> {
        let mut jobs: Vec<FailedSyncJob> = self.jobs.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by(|a, b| a.failed_at.cmp(&b.failed_at).then(a.id.cmp(&b.id)));
        jobs
    }

    /// Number of jobs in any status
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the registry holds no job
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Simulate the backing table being unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SearchError::Storage(
                "dead-letter registry unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn not_found(id: Ulid) -> SearchError {
        SearchError::Storage(format!("dead-letter job {id} not found"))
    }
}

#[async_trait]
impl DeadLetterRegistry for InMemoryDeadLetterRegistry {
    async fn record_failure(&self, job: FailedSyncJob) -> Result<()> {
        self.check_available()?;
        tracing::warn!(
            "Recorded failed {} sync for product {} as job {}: {}",
            job.operation,
            job.product_id,
            job.id,
            job.error_message
        );
        self.jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_jobs_ready_for_retry(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<FailedSyncJob>> {
        self.check_available()?;
        let mut ready: Vec<FailedSyncJob> = self
            .jobs
            .iter()
            .filter(|j| j.is_ready(now))
            .map(|j| j.value().clone())
            .collect();
        ready.sort_by(|a, b| a.failed_at.cmp(&b.failed_at).then(a.id.cmp(&b.id)));
        ready.truncate(limit);
        Ok(ready)
    }

    async fn mark_as_retrying(&self, id: Ulid, now: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        let mut job = self.jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        job.status = JobStatus::Retrying;
        job.retry_started_at = Some(now);
        Ok(())
    }

    async fn release(&self, id: Ulid) -> Result<()> {
        self.check_available()?;
        let mut job = self.jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        if job.status == JobStatus::Retrying {
            job.status = JobStatus::Failed;
            job.retry_started_at = None;
        }
        Ok(())
    }

    async fn mark_as_resolved(&self, id: Ulid, now: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        let mut job = self.jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        job.status = JobStatus::Resolved;
        job.retry_started_at = None;
        job.last_retry_at = Some(now);
        job.resolved_at = Some(now);
        job.retry_after = None;
        Ok(())
    }

    async fn update_after_retry_failure(
        &self,
        id: Ulid,
        error: &SearchError,
        now: DateTime<Utc>,
    ) -> Result<FailedSyncJob> {
        self.check_available()?;
        let mut job = self.jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        job.attempts += 1;
        job.last_retry_at = Some(now);
        job.retry_started_at = None;
        job.error_message = error.to_string();
        job.error_trace = error.error_chain().to_string();
        job.retry_after = calculate_retry_time(job.attempts, now);
        job.status = if job.retry_after.is_some() {
            JobStatus::Failed
        } else {
            tracing::error!(
                "Abandoning sync job {} for product {} after {} attempts",
                job.id,
                job.product_id,
                job.attempts
            );
            JobStatus::Abandoned
        };
        Ok(job.clone())
    }

    async fn get(&self, id: Ulid) -> Result<Option<FailedSyncJob>> {
        self.check_available()?;
        Ok(self.jobs.get(&id).map(|j| j.clone()))
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<FailedSyncJob>> {
        self.check_available()?;
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|j| j.status == status)
            .collect())
    }

    async fn purge_resolved(&self, older_than: DateTime<Utc>) -> Result<usize> {
        self.check_available()?;
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.status == JobStatus::Resolved
                && job.resolved_at.map(|at| at < older_than).unwrap_or(false))
        });
        Ok(before - self.jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::product;
    use tempfile::TempDir;

    fn update_event(id: &str) -> ProductEvent {
        ProductEvent::updated(product(id))
    }

    fn failure() -> SearchError {
        SearchError::unavailable(SearchError::EmbeddingGeneration("503".to_string()))
    }

    #[test]
    fn test_backoff_table() {
        let now = Utc::now();
        assert_eq!(calculate_retry_time(1, now), Some(now + ChronoDuration::seconds(60)));
        assert_eq!(calculate_retry_time(2, now), Some(now + ChronoDuration::seconds(300)));
        assert_eq!(calculate_retry_time(3, now), Some(now + ChronoDuration::seconds(1_800)));
        assert_eq!(calculate_retry_time(4, now), Some(now + ChronoDuration::seconds(7_200)));
        assert_eq!(calculate_retry_time(5, now), None);
        assert_eq!(calculate_retry_time(9, now), None);
        assert_eq!(backoff_delay(5), Some(ChronoDuration::seconds(86_400)));
    }

    #[test]
    fn test_first_failure_job() {
        let now = Utc::now();
        let job = FailedSyncJob::first_failure(&update_event("sku-1"), &failure(), now);

        assert_eq!(job.attempts, 1);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.operation, SyncOperation::Update);
        assert_eq!(job.retry_after, Some(now + ChronoDuration::seconds(60)));
        assert!(job.error_trace.contains("Caused by"));
        assert!(!job.is_ready(now));
        assert!(job.is_ready(now + ChronoDuration::seconds(60)));
    }

    #[tokio::test]
    async fn test_ready_jobs_oldest_first_with_limit() {
        let registry = InMemoryDeadLetterRegistry::new();
        let t0 = Utc::now();
        let older = FailedSyncJob::first_failure(&update_event("a"), &failure(), t0);
        let newer = FailedSyncJob::first_failure(
            &update_event("b"),
            &failure(),
            t0 + ChronoDuration::seconds(5),
        );
        registry.record_failure(newer.clone()).await.unwrap();
        registry.record_failure(older.clone()).await.unwrap();

        let later = t0 + ChronoDuration::minutes(10);
        let ready = registry.get_jobs_ready_for_retry(10, later).await.unwrap();
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].id, older.id);

        let ready = registry.get_jobs_ready_for_retry(1, later).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert!(registry.get_jobs_ready_for_retry(10, t0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_failures_walk_the_table_then_abandon() {
        let registry = InMemoryDeadLetterRegistry::new();
        let mut now = Utc::now();
        let job = FailedSyncJob::first_failure(&update_event("a"), &failure(), now);
        let id = job.id;
        registry.record_failure(job).await.unwrap();

        let expected = [(2, 300), (3, 1_800), (4, 7_200)];
        for (attempts, delay) in expected {
            now += ChronoDuration::days(2);
            registry.mark_as_retrying(id, now).await.unwrap();
            let job = registry
                .update_after_retry_failure(id, &failure(), now)
                .await
                .unwrap();
            assert_eq!(job.attempts, attempts);
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.retry_after, Some(now + ChronoDuration::seconds(delay)));
            assert_eq!(job.last_retry_at, Some(now));
        }

        now += ChronoDuration::days(2);
        let job = registry
            .update_after_retry_failure(id, &failure(), now)
            .await
            .unwrap();
        assert_eq!(job.attempts, 5);
        assert_eq!(job.status, JobStatus::Abandoned);
        assert_eq!(job.retry_after, None);
        assert!(registry
            .get_jobs_ready_for_retry(10, now + ChronoDuration::days(30))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_retrying_jobs_are_not_picked_twice() {
        let registry = InMemoryDeadLetterRegistry::new();
        let now = Utc::now();
        let job = FailedSyncJob::first_failure(&update_event("a"), &failure(), now);
        let id = job.id;
        registry.record_failure(job).await.unwrap();

        let picked_at = now + ChronoDuration::minutes(2);
        registry.mark_as_retrying(id, picked_at).await.unwrap();
        let later = picked_at + ChronoDuration::minutes(10);
        assert!(registry.get_jobs_ready_for_retry(10, later).await.unwrap().is_empty());
        assert_eq!(
            registry.list_by_status(JobStatus::Retrying).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_abandoned_lease_is_taken_over() {
        let registry = InMemoryDeadLetterRegistry::new();
        let now = Utc::now();
        let job = FailedSyncJob::first_failure(&update_event("a"), &failure(), now);
        let id = job.id;
        registry.record_failure(job).await.unwrap();

        let picked_at = now + ChronoDuration::minutes(2);
        registry.mark_as_retrying(id, picked_at).await.unwrap();
        let expired = picked_at + ChronoDuration::seconds(RETRY_LEASE_SECONDS);
        let ready = registry.get_jobs_ready_for_retry(10, expired).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_release_returns_job_to_queue() {
        let registry = InMemoryDeadLetterRegistry::new();
        let now = Utc::now();
        let job = FailedSyncJob::first_failure(&update_event("a"), &failure(), now);
        let id = job.id;
        let retry_after = job.retry_after;
        registry.record_failure(job).await.unwrap();

        let picked_at = now + ChronoDuration::minutes(2);
        registry.mark_as_retrying(id, picked_at).await.unwrap();
        registry.release(id).await.unwrap();

        let job = registry.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_after, retry_after);
        assert_eq!(job.retry_started_at, None);
        assert_eq!(
            registry.get_jobs_ready_for_retry(10, picked_at).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_resolve_and_purge() {
        let registry = InMemoryDeadLetterRegistry::new();
        let now = Utc::now();
        let job = FailedSyncJob::first_failure(&update_event("a"), &failure(), now);
        let id = job.id;
        registry.record_failure(job).await.unwrap();

        registry.mark_as_resolved(id, now).await.unwrap();
        let resolved = registry.get(id).await.unwrap().unwrap();
        assert_eq!(resolved.status, JobStatus::Resolved);
        assert_eq!(resolved.retry_after, None);

        assert_eq!(registry.purge_resolved(now).await.unwrap(), 0);
        assert_eq!(
            registry
                .purge_resolved(now + ChronoDuration::seconds(1))
                .await
                .unwrap(),
            1
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_storage_error() {
        let registry = InMemoryDeadLetterRegistry::new();
        assert!(matches!(
            registry.mark_as_retrying(Ulid::new(), Utc::now()).await,
            Err(SearchError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_json_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("dead_letters.json");
        let registry = InMemoryDeadLetterRegistry::new();
        let job = FailedSyncJob::first_failure(
            &ProductEvent::deleted("gone"),
            &failure(),
            Utc::now(),
        );
        registry.record_failure(job.clone()).await.unwrap();
        registry.save_json(&path).unwrap();

        let loaded = InMemoryDeadLetterRegistry::load_json(&path).unwrap();
        assert_eq!(loaded.snapshot(), vec![job]);
        assert!(InMemoryDeadLetterRegistry::load_json(&dir.path().join("missing.json"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Abandoned".parse::<JobStatus>().unwrap(), JobStatus::Abandoned);
        assert!("stuck".parse::<JobStatus>().is_err());
    }
}
