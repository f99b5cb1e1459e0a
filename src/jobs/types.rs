use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::jobs::error::JobResult;
use crate::jobs::payload::{JobConfig, JobResults};
use crate::models::JobType;
use crate::repositories::JobStore;

/// Job execution context passed to handlers
#[derive(Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub entity_id: Uuid,
    pub job_type: JobType,
    pub config: JobConfig,
    pub progress: ProgressReporter,
}

/// Best-effort progress writer for one running job.
///
/// Values are clamped to `0..=100` and only increases are persisted. A failed
/// write is logged and otherwise ignored; progress is informational.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: Uuid,
    store: Arc<dyn JobStore>,
    last: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new(job_id: Uuid, store: Arc<dyn JobStore>) -> Self {
        Self {
            job_id,
            store,
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    pub async fn report(&self, progress: u32) {
        let progress = progress.min(100) as u8;
        if self.last.fetch_max(progress, Ordering::SeqCst) >= progress {
            return;
        }

        if let Err(e) = self.store.update_progress(self.job_id, progress).await {
            tracing::warn!(job_id = %self.job_id, progress, error = %e, "Failed to persist job progress");
        }
    }

    /// Report `done` out of `total` steps.
    pub async fn report_fraction(&self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        self.report((done * 100 / total) as u32).await;
    }

    pub fn last(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}

/// Trait that every job type implementation must provide
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Run the job. Recoverable sub-failures go into the returned results;
    /// an `Err` marks the whole job failed.
    async fn execute(&self, ctx: JobContext) -> JobResult<JobResults>;

    fn description(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, NewJob};
    use crate::repositories::MemoryStore;
    use jiff::Timestamp;

    #[tokio::test]
    async fn test_progress_is_clamped_and_monotonic() {
        let store = Arc::new(MemoryStore::new());
        let now = Timestamp::now();
        let job = store
            .insert_job(
                NewJob::new(
                    Uuid::new_v4(),
                    JobConfig::default_for(JobType::TrendAnalysis),
                    now,
                ),
                now,
            )
            .await
            .unwrap();
        store.claim_job(job.id, now).await.unwrap();

        let reporter = ProgressReporter::new(job.id, store.clone());
        reporter.report(40).await;
        reporter.report(20).await;
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap().progress, 40);

        reporter.report(250).await;
        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(reporter.last(), 100);
    }

    #[tokio::test]
    async fn test_progress_on_missing_job_is_swallowed() {
        let reporter = ProgressReporter::new(Uuid::new_v4(), Arc::new(MemoryStore::new()));
        reporter.report_fraction(1, 4).await;
        assert_eq!(reporter.last(), 25);
    }
}
