//! Scheduled replay of dead-letter jobs

use super::dead_letter::{DeadLetterRegistry, FailedSyncJob, JobStatus};
use super::orchestrator::EmbeddingSyncOrchestrator;
use crate::error::{ErrorChainExt, ErrorContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Totals of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Jobs picked up
    pub examined: usize,
    /// Jobs whose replay succeeded
    pub resolved: usize,
    /// Jobs that failed again and were rescheduled
    pub rescheduled: usize,
    /// Jobs that failed again and ran out of attempts
    pub abandoned: usize,
    /// Jobs whose outcome could not be recorded; they stay queued for a later sweep
    #[serde(default)]
    pub deferred: usize,
}

/// Replays jobs whose retry time has come
pub struct RetrySweeper {
    orchestrator: Arc<EmbeddingSyncOrchestrator>,
    dead_letters: Arc<dyn DeadLetterRegistry>,
    batch_size: usize,
}

impl RetrySweeper {
    /// Sweeper replaying at most `batch_size` jobs per run
    pub fn new(
        orchestrator: Arc<EmbeddingSyncOrchestrator>,
        dead_letters: Arc<dyn DeadLetterRegistry>,
        batch_size: usize,
    ) -> Self {
        Self {
            orchestrator,
            dead_letters,
            batch_size: batch_size.max(1),
        }
    }

    /// Replay every job ready at `now`, oldest first
    ///
    /// Only a failure to list the ready jobs aborts the sweep. A registry error while
    /// recording one job's outcome hands that job back to the queue and the sweep moves on.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let jobs = self
            .dead_letters
            .get_jobs_ready_for_retry(self.batch_size, now)
            .await?;
        let mut report = SweepReport {
            examined: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            match self.retry(&job, now).await {
                Ok(JobStatus::Resolved) => report.resolved += 1,
                Ok(JobStatus::Abandoned) => report.abandoned += 1,
                Ok(_) => report.rescheduled += 1,
                Err(error) => {
                    tracing::error!(
                        "Could not record retry of sync job {} for product {}: {}",
                        job.id,
                        job.product_id,
                        error.error_chain()
                    );
                    if let Err(e) = self.dead_letters.release(job.id).await {
                        tracing::warn!(
                            "Sync job {} stays leased until its lease runs out: {}",
                            job.id,
                            e
                        );
                    }
                    report.deferred += 1;
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(
                "Retry sweep: {} examined, {} resolved, {} rescheduled, {} abandoned, {} deferred",
                report.examined,
                report.resolved,
                report.rescheduled,
                report.abandoned,
                report.deferred
            );
        }
        Ok(report)
    }

    /// Replay one job and record the outcome, returning the job's new status
    async fn retry(&self, job: &FailedSyncJob, now: DateTime<Utc>) -> Result<JobStatus> {
        self.dead_letters
            .mark_as_retrying(job.id, now)
            .await
            .with_context(|| format!("claiming sync job {}", job.id))?;

        match self.orchestrator.replay(&job.payload_snapshot, now).await {
            Ok(()) => {
                self.dead_letters
                    .mark_as_resolved(job.id, now)
                    .await
                    .with_context(|| format!("resolving sync job {}", job.id))?;
                tracing::info!(
                    "Resolved sync job {} for product {} on attempt {}",
                    job.id,
                    job.product_id,
                    job.attempts + 1
                );
                Ok(JobStatus::Resolved)
            }
            Err(error) => {
                let updated = self
                    .dead_letters
                    .update_after_retry_failure(job.id, &error, now)
                    .await
                    .with_context(|| format!("rescheduling sync job {}", job.id))?;
                Ok(updated.status)
            }
        }
    }
}
