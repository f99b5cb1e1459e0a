//! Job service for administrative job operations.

use std::sync::Arc;

use jiff::Timestamp;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::payload::JobConfig;
use crate::models::{DEFAULT_PRIORITY, Job, JobType, MAX_PRIORITY, NewJob, QueueStats};
use crate::repositories::{EntityDirectory, JobStore};

/// Manual enqueue request, validated by [`JobService::queue_job`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueueJob {
    pub entity_id: Uuid,
    pub job_type: JobType,
    /// Raw config for `job_type`; `None` uses the type's defaults
    pub config: Option<JsonValue>,
    pub priority: Option<i16>,
    /// Defaults to now
    pub scheduled_at: Option<Timestamp>,
}

#[derive(Clone)]
pub struct JobService {
    jobs: Arc<dyn JobStore>,
    entities: Arc<dyn EntityDirectory>,
}

impl JobService {
    pub fn new(jobs: Arc<dyn JobStore>, entities: Arc<dyn EntityDirectory>) -> Self {
        Self { jobs, entities }
    }

    /// Validate and persist a `pending` job.
    pub async fn queue_job(&self, request: QueueJob) -> AppResult<Job> {
        let priority = request.priority.unwrap_or(DEFAULT_PRIORITY);
        if !(0..=MAX_PRIORITY).contains(&priority) {
            return Err(AppError::validation(
                "priority",
                format!("priority must be between 0 and {}", MAX_PRIORITY),
            ));
        }

        let config = match &request.config {
            Some(value) => JobConfig::decode(request.job_type, value)?,
            None => JobConfig::default_for(request.job_type),
        };

        if self.entities.get_entity(request.entity_id).await?.is_none() {
            return Err(AppError::not_found(
                "MonitoredEntity",
                "id",
                request.entity_id,
            ));
        }

        let now = Timestamp::now();
        let new_job = NewJob::new(
            request.entity_id,
            config,
            request.scheduled_at.unwrap_or(now),
        )
        .with_priority(priority);

        let job = self.jobs.insert_job(new_job, now).await?;
        tracing::info!(job_id = %job.id, job_type = %job.job_type, priority, "Job queued");
        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> AppResult<Job> {
        self.jobs
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found("Job", "id", id))
    }

    /// Cancel a `pending` job. Jobs in any other state are left untouched.
    pub async fn cancel_job(&self, id: Uuid) -> AppResult<Job> {
        if !self.jobs.cancel_job(id, Timestamp::now()).await? {
            let job = self.get_job(id).await?;
            return Err(AppError::UnprocessableContent {
                message: format!(
                    "Only pending jobs can be cancelled; job {} is {}",
                    id, job.status
                ),
            });
        }

        tracing::info!(job_id = %id, "Job cancelled");
        self.get_job(id).await
    }

    pub async fn queue_stats(&self) -> AppResult<QueueStats> {
        self.jobs.queue_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, MonitoredEntity, Platform};
    use crate::repositories::MemoryStore;
    use serde_json::json;

    async fn service() -> (JobService, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let entity = MonitoredEntity {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Acme".to_string(),
            monitoring_frequency: "daily".to_string(),
            tracking_queries: vec!["best crm".to_string()],
            platforms: vec![Platform::Chatgpt],
            active: true,
        };
        let id = entity.id;
        store.insert_entity(entity).await;
        (JobService::new(store.clone(), store.clone()), store, id)
    }

    fn request(entity_id: Uuid) -> QueueJob {
        QueueJob {
            entity_id,
            job_type: JobType::TrendAnalysis,
            config: Some(json!({"window": 14})),
            priority: Some(8),
            scheduled_at: None,
        }
    }

    #[tokio::test]
    async fn test_queue_job_applies_typed_config() {
        let (service, _, entity_id) = service().await;
        let job = service.queue_job(request(entity_id)).await.unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, 8);
        assert_eq!(
            job.config,
            JobConfig::TrendAnalysis(crate::jobs::payload::TrendAnalysisConfig { window: 14 })
        );
    }

    #[tokio::test]
    async fn test_queue_job_rejects_bad_input() {
        let (service, store, entity_id) = service().await;

        let mut bad_priority = request(entity_id);
        bad_priority.priority = Some(11);
        assert!(matches!(
            service.queue_job(bad_priority).await.unwrap_err(),
            AppError::Validation { field, .. } if field == "priority"
        ));

        let mut bad_config = request(entity_id);
        bad_config.config = Some(json!({"window": 0}));
        assert!(matches!(
            service.queue_job(bad_config).await.unwrap_err(),
            AppError::ValidationErrors { .. }
        ));

        assert!(matches!(
            service.queue_job(request(Uuid::new_v4())).await.unwrap_err(),
            AppError::NotFound { .. }
        ));
        assert_eq!(store.queue_stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_only_pending_jobs_can_be_cancelled() {
        let (service, store, entity_id) = service().await;
        let job = service.queue_job(request(entity_id)).await.unwrap();
        let running = service.queue_job(request(entity_id)).await.unwrap();
        store.claim_job(running.id, Timestamp::now()).await.unwrap();

        let cancelled = service.cancel_job(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        let err = service.cancel_job(running.id).await.unwrap_err();
        assert!(matches!(err, AppError::UnprocessableContent { .. }));
        assert!(matches!(
            service.cancel_job(Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound { .. }
        ));

        let stats = service.queue_stats().await.unwrap();
        assert_eq!((stats.cancelled, stats.running), (1, 1));
    }
}
