use std::sync::Arc;

use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler as TokioCronScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::payload::JobConfig;
use crate::models::{Job, JobType, MonitoredEntity, NewJob};
use crate::repositories::{EntityDirectory, JobStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    pub entities: usize,
    pub enqueued: usize,
    pub failed: usize,
}

/// Enqueues recurring jobs for monitored entities whose interval has elapsed.
pub struct Scheduler {
    config: SchedulerConfig,
    jobs: Arc<dyn JobStore>,
    entities: Arc<dyn EntityDirectory>,
    cron: Mutex<Option<TokioCronScheduler>>,
    // Held across the active-job check and the insert.
    enqueue: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        jobs: Arc<dyn JobStore>,
        entities: Arc<dyn EntityDirectory>,
    ) -> Self {
        Self {
            config,
            jobs,
            entities,
            cron: Mutex::new(None),
            enqueue: Mutex::new(()),
        }
    }

    /// Enqueue every recurring job type that is due for `entity`.
    ///
    /// A type with a `pending` or `running` job is skipped, so calling this
    /// twice within one interval enqueues nothing the second time. Calls are
    /// serialized, so concurrent passes cannot both enqueue the same type.
    pub async fn schedule_entity_jobs(
        &self,
        entity: &MonitoredEntity,
        now: Timestamp,
    ) -> AppResult<Vec<Job>> {
        let interval = entity.frequency().interval();
        let mut created = Vec::new();
        let _enqueue = self.enqueue.lock().await;

        for job_type in JobType::RECURRING {
            if self.jobs.find_active_job(entity.id, job_type).await?.is_some() {
                tracing::debug!(entity_id = %entity.id, job_type = %job_type, "Job already active, skipping");
                continue;
            }

            let due = match self.jobs.last_completed_job(entity.id, job_type).await? {
                Some(Job {
                    completed_at: Some(completed_at),
                    ..
                }) => now.duration_since(completed_at) >= interval,
                _ => true,
            };
            if !due {
                continue;
            }

            let new_job = NewJob::new(
                entity.id,
                JobConfig::default_for(job_type),
                now + job_type.stagger(),
            );
            let job = self.jobs.insert_job(new_job, now).await?;
            tracing::info!(
                entity_id = %entity.id,
                job_id = %job.id,
                job_type = %job_type,
                scheduled_at = %job.scheduled_at,
                "Scheduled recurring job"
            );
            created.push(job);
        }

        Ok(created)
    }

    /// Schedule a single entity by id, regardless of the cron sweep.
    pub async fn schedule_entity(&self, entity_id: Uuid) -> AppResult<Vec<Job>> {
        let entity = self
            .entities
            .get_entity(entity_id)
            .await?
            .ok_or_else(|| AppError::not_found("MonitoredEntity", "id", entity_id))?;

        if !entity.active {
            return Err(AppError::UnprocessableContent {
                message: format!("Monitored entity {} is inactive", entity_id),
            });
        }

        self.schedule_entity_jobs(&entity, Timestamp::now()).await
    }

    /// One scheduling pass over every active entity. A failure for one
    /// entity is logged and counted without affecting the rest.
    pub async fn run_once(&self) -> AppResult<ScheduleReport> {
        let entities = self.entities.list_monitored_entities().await?;
        let now = Timestamp::now();
        let mut report = ScheduleReport {
            entities: entities.len(),
            ..ScheduleReport::default()
        };

        for entity in &entities {
            match self.schedule_entity_jobs(entity, now).await {
                Ok(jobs) => report.enqueued += jobs.len(),
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(entity_id = %entity.id, error = %e, "Failed to schedule entity jobs");
                }
            }
        }

        tracing::info!(
            entities = report.entities,
            enqueued = report.enqueued,
            failed = report.failed,
            "Scheduling pass finished"
        );
        Ok(report)
    }

    /// Start the cron-driven sweep. Calling it while started does nothing.
    pub async fn start(self: &Arc<Self>) -> AppResult<()> {
        let mut cron = self.cron.lock().await;
        if cron.is_some() {
            return Ok(());
        }

        let scheduler = TokioCronScheduler::new().await.map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?;

        let this = Arc::clone(self);
        let sweep = CronJob::new_async(self.config.cron.as_str(), move |_uuid, _lock| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                if let Err(e) = this.run_once().await {
                    tracing::error!(error = %e, "Scheduling pass failed");
                }
            })
        })
        .map_err(|e| AppError::validation("scheduler.cron", format!("Invalid cron expression: {}", e)))?;

        scheduler.add(sweep).await.map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?;
        scheduler.start().await.map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?;

        *cron = Some(scheduler);
        tracing::info!(cron = %self.config.cron, "Scheduler started");
        Ok(())
    }

    pub async fn stop(&self) -> AppResult<()> {
        let Some(mut scheduler) = self.cron.lock().await.take() else {
            return Ok(());
        };

        scheduler.shutdown().await.map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.cron.lock().await.is_some()
    }
}
