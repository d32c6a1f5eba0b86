use catalog_search::kv::InMemoryKeyValueStore;
use catalog_search::sync::{
    DeadLetterRegistry, EmbeddingSyncOrchestrator, FailureRateMonitor,
    InMemoryDeadLetterRegistry, JobStatus, ProductEvent, RetrySweeper, SyncOperation,
    SyncOutcome, RETRY_LEASE_SECONDS,
};
use catalog_search::test_utils::{
    product, product_with, CountingEmbeddingClient, FlakyDeadLetterRegistry,
    RecordingAlertNotifier,
};
use catalog_search::vector_store::{InMemoryVectorStore, VectorStore};
use catalog_search::{ProductId, SearchConfig, SearchError};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;

struct Pipeline {
    orchestrator: Arc<EmbeddingSyncOrchestrator>,
    embedder: Arc<CountingEmbeddingClient>,
    vectors: Arc<InMemoryVectorStore>,
    dead_letters: Arc<InMemoryDeadLetterRegistry>,
    registry: Arc<dyn DeadLetterRegistry>,
    notifier: RecordingAlertNotifier,
}

fn pipeline(embedder: CountingEmbeddingClient) -> Pipeline {
    let dead_letters = Arc::new(InMemoryDeadLetterRegistry::new());
    pipeline_over(embedder, dead_letters.clone(), dead_letters)
}

/// Pipeline writing through `registry`, whose jobs are visible in `dead_letters`
fn pipeline_over(
    embedder: CountingEmbeddingClient,
    dead_letters: Arc<InMemoryDeadLetterRegistry>,
    registry: Arc<dyn DeadLetterRegistry>,
) -> Pipeline {
    let config = SearchConfig::default();
    let embedder = Arc::new(embedder);
    let vectors = Arc::new(InMemoryVectorStore::new());
    let notifier = RecordingAlertNotifier::default();
    let monitor = Arc::new(FailureRateMonitor::new(
        Arc::new(InMemoryKeyValueStore::new()),
        Arc::new(notifier.clone()),
        &config,
    ));
    let orchestrator = Arc::new(EmbeddingSyncOrchestrator::new(
        embedder.clone(),
        vectors.clone(),
        registry.clone(),
        monitor,
        &config,
    ));
    Pipeline {
        orchestrator,
        embedder,
        vectors,
        dead_letters,
        registry,
        notifier,
    }
}

fn flaky_pipeline(embedder: CountingEmbeddingClient) -> (Pipeline, FlakyDeadLetterRegistry) {
    let flaky = FlakyDeadLetterRegistry::default();
    let p = pipeline_over(
        embedder,
        Arc::new(flaky.inner().clone()),
        Arc::new(flaky.clone()),
    );
    (p, flaky)
}

fn sweeper(p: &Pipeline) -> RetrySweeper {
    RetrySweeper::new(p.orchestrator.clone(), p.registry.clone(), 50)
}

async fn dead_letter(p: &Pipeline, sku: &str, now: chrono::DateTime<Utc>) -> ulid::Ulid {
    match p
        .orchestrator
        .handle_at(ProductEvent::created(product(sku)), now)
        .await
    {
        SyncOutcome::Failed {
            job_id: Some(id), ..
        } => id,
        other => panic!("expected a dead-letter job, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_update_delete_mirror_into_vector_store() {
    let p = pipeline(CountingEmbeddingClient::new());

    let created = p
        .orchestrator
        .handle(ProductEvent::created(product("sku-1")))
        .await;
    assert!(created.is_synced());
    assert_eq!(p.vectors.len(), 1);

    let mut renamed = product("sku-1");
    renamed.name = "Renamed Product".to_string();
    assert!(p
        .orchestrator
        .handle(ProductEvent::updated(renamed))
        .await
        .is_synced());
    let document = p
        .vectors
        .get(&ProductId::from("sku-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.name, "Renamed Product");
    assert_eq!(p.vectors.len(), 1);
    assert!(p.embedder.texts()[1].starts_with("Renamed Product"));

    assert!(p
        .orchestrator
        .handle(ProductEvent::deleted("sku-1"))
        .await
        .is_synced());
    assert!(p.vectors.is_empty());

    let stats = p.orchestrator.monitor().stats().await.unwrap();
    assert_eq!(stats.successes, 3);
    assert_eq!(stats.failures, 0);
    assert!(p.dead_letters.is_empty());
}

#[tokio::test]
async fn test_deleting_unknown_product_is_not_a_failure() {
    let p = pipeline(CountingEmbeddingClient::new());
    let outcome = p.orchestrator.handle(ProductEvent::deleted("never-synced")).await;
    assert_eq!(outcome, SyncOutcome::Synced);
}

#[tokio::test]
async fn test_failed_sync_lands_in_dead_letter_registry() {
    let p = pipeline(CountingEmbeddingClient::failing());
    let now = Utc::now();

    let outcome = p
        .orchestrator
        .handle_at(ProductEvent::created(product("sku-2")), now)
        .await;

    let SyncOutcome::Failed { job_id, error } = outcome else {
        panic!("expected a failed outcome");
    };
    assert!(error.contains("503"));
    let job = p.dead_letters.get(job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(job.product_id.as_str(), "sku-2");
    assert_eq!(job.operation, SyncOperation::Create);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_after, Some(now + ChronoDuration::seconds(60)));
    assert_eq!(job.payload_snapshot, ProductEvent::created(product("sku-2")));
    assert!(p.vectors.is_empty());

    let stats = p.orchestrator.monitor().stats().await.unwrap();
    assert_eq!(stats.failures, 1);
}

#[tokio::test]
async fn test_oversized_description_is_dead_lettered_without_embedding() {
    let p = pipeline(CountingEmbeddingClient::new());
    let oversized = product_with("sku-3", "Huge", &"x".repeat(32_001), "Books");

    let outcome = p.orchestrator.handle(ProductEvent::updated(oversized)).await;

    assert!(!outcome.is_synced());
    assert_eq!(p.embedder.calls(), 0);
    assert_eq!(p.dead_letters.len(), 1);
    assert!(matches!(
        p.orchestrator
            .sync(&ProductEvent::updated(product_with(
                "sku-3",
                "Huge",
                &"x".repeat(32_001),
                "Books"
            )))
            .await,
        Err(SearchError::Validation(_))
    ));
}

#[tokio::test]
async fn test_registry_outage_still_returns_failed_outcome() {
    let p = pipeline(CountingEmbeddingClient::failing());
    p.dead_letters.set_unavailable(true);

    let outcome = p.orchestrator.handle(ProductEvent::created(product("sku-4"))).await;

    assert!(matches!(outcome, SyncOutcome::Failed { job_id: None, .. }));
}

#[tokio::test]
async fn test_sync_all_reports_failures() {
    let p = pipeline(CountingEmbeddingClient::failing_times(1));

    let report = p
        .orchestrator
        .sync_all(vec![product("a"), product("b"), product("c")])
        .await;

    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.dead_letter_jobs.len(), 1);
    assert_eq!(p.vectors.len(), 2);
}

#[tokio::test]
async fn test_sweeper_resolves_job_once_provider_recovers() {
    let p = pipeline(CountingEmbeddingClient::failing());
    let now = Utc::now();
    p.orchestrator
        .handle_at(ProductEvent::created(product("sku-5")), now)
        .await;

    // Not due yet
    let early = sweeper(&p).run_once(now + ChronoDuration::seconds(30)).await.unwrap();
    assert_eq!(early.examined, 0);

    p.embedder.set_failing(false);
    let later = now + ChronoDuration::seconds(61);
    let report = sweeper(&p).run_once(later).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.resolved, 1);

    let resolved = p.dead_letters.list_by_status(JobStatus::Resolved).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].resolved_at, Some(later));
    assert_eq!(p.vectors.len(), 1);

    let purged = p
        .dead_letters
        .purge_resolved(later + ChronoDuration::seconds(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(p.dead_letters.is_empty());
}

#[tokio::test]
async fn test_sweeper_walks_backoff_table_then_abandons() {
    let p = pipeline(CountingEmbeddingClient::failing());
    let SyncOutcome::Failed {
        job_id: Some(id), ..
    } = p
        .orchestrator
        .handle_at(ProductEvent::created(product("sku-6")), Utc::now())
        .await
    else {
        panic!("expected a dead-letter job");
    };
    walk_backoff(&p, id).await;
}

async fn walk_backoff(p: &Pipeline, id: ulid::Ulid) {
    let sweeper = sweeper(p);
    let mut attempts = 1;
    for expected_delay in [300, 1_800, 7_200] {
        let job = p.dead_letters.get(id).await.unwrap().unwrap();
        let due = job.retry_after.unwrap();
        let report = sweeper.run_once(due).await.unwrap();
        assert_eq!(report.rescheduled, 1);

        attempts += 1;
        let job = p.dead_letters.get(id).await.unwrap().unwrap();
        assert_eq!(job.attempts, attempts);
        assert_eq!(job.last_retry_at, Some(due));
        assert_eq!(
            job.retry_after,
            Some(due + ChronoDuration::seconds(expected_delay))
        );
    }

    let due = p
        .dead_letters
        .get(id)
        .await
        .unwrap()
        .unwrap()
        .retry_after
        .unwrap();
    let report = sweeper.run_once(due).await.unwrap();
    assert_eq!(report.abandoned, 1);

    let job = p.dead_letters.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Abandoned);
    assert_eq!(job.attempts, 5);
    assert_eq!(job.retry_after, None);

    let idle = sweeper
        .run_once(due + ChronoDuration::days(30))
        .await
        .unwrap();
    assert_eq!(idle.examined, 0);
}

#[tokio::test]
async fn test_sustained_failures_alert_once_per_cooldown() {
    let p = pipeline(CountingEmbeddingClient::failing());
    let now = Utc::now();

    for i in 0..5 {
        p.orchestrator
            .handle_at(ProductEvent::created(product(&format!("p{i}"))), now)
            .await;
    }
    assert_eq!(p.notifier.alerts().len(), 1);
    assert_eq!(p.notifier.alerts()[0].failure_rate_percent, 100.0);

    p.orchestrator
        .handle_at(
            ProductEvent::created(product("late")),
            now + ChronoDuration::minutes(16),
        )
        .await;
    assert_eq!(p.notifier.alerts().len(), 2);
}

#[tokio::test]
async fn test_registry_failure_mid_batch_defers_only_that_job() {
    let (p, flaky) = flaky_pipeline(CountingEmbeddingClient::failing());
    let now = Utc::now();
    let first = dead_letter(&p, "sku-a", now).await;
    let stuck = dead_letter(&p, "sku-b", now).await;
    let third = dead_letter(&p, "sku-c", now).await;

    p.embedder.set_failing(false);
    flaky.fail_writes_for(stuck);
    let due = now + ChronoDuration::seconds(61);
    let report = sweeper(&p).run_once(due).await.unwrap();

    assert_eq!(report.examined, 3);
    assert_eq!(report.resolved, 2);
    assert_eq!(report.deferred, 1);
    for id in [first, third] {
        let job = p.dead_letters.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Resolved);
    }

    let job = p.dead_letters.get(stuck).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.retry_started_at, None);

    flaky.heal();
    let report = sweeper(&p)
        .run_once(due + ChronoDuration::seconds(1))
        .await
        .unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.resolved, 1);
    assert_eq!(
        p.dead_letters.list_by_status(JobStatus::Resolved).await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_job_left_retrying_is_taken_over_after_lease() {
    let (p, flaky) = flaky_pipeline(CountingEmbeddingClient::failing());
    let now = Utc::now();
    let id = dead_letter(&p, "sku-d", now).await;

    flaky.fail_writes_for(id);
    flaky.set_release_failing(true);
    let due = now + ChronoDuration::seconds(61);
    let report = sweeper(&p).run_once(due).await.unwrap();
    assert_eq!(report.deferred, 1);
    let job = p.dead_letters.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Retrying);

    flaky.heal();
    let within_lease = sweeper(&p)
        .run_once(due + ChronoDuration::minutes(5))
        .await
        .unwrap();
    assert_eq!(within_lease.examined, 0);

    let later = due + ChronoDuration::seconds(RETRY_LEASE_SECONDS);
    let report = sweeper(&p).run_once(later).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.rescheduled, 1);

    let job = p.dead_letters.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 2);
    assert_eq!(job.retry_after, Some(later + ChronoDuration::seconds(300)));
}
