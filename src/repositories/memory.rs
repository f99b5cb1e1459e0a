//! In-process backend for tests and `serve --in-memory`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use jiff::Timestamp;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::payload::JobResults;
use crate::models::{
    Batch, BatchItem, BatchStatus, ItemStatus, Job, JobStatus, JobType, MonitoredEntity, NewJob,
    QueueStats,
};
use crate::repositories::{BatchStore, EntityDirectory, JobStore};

#[derive(Default)]
struct MemoryState {
    // Vectors keep insertion order, which breaks ties the way created_at does in Postgres.
    jobs: Vec<Job>,
    batches: Vec<Batch>,
    items: Vec<BatchItem>,
    entities: HashMap<Uuid, MonitoredEntity>,
    usage: HashMap<Uuid, i64>,
}

impl MemoryState {
    fn job_mut(&mut self, id: Uuid) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    fn batch_mut(&mut self, id: Uuid) -> Option<&mut Batch> {
        self.batches.iter_mut().find(|b| b.id == id)
    }

    fn item_mut(&mut self, id: Uuid) -> Option<&mut BatchItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }
}

/// Every store trait over one lock-protected state.
///
/// Conditional updates mirror the SQL `WHERE status = ...` guards, so
/// late or duplicate writes behave exactly as they do against Postgres.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    batch_poll_faults: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_entity(&self, entity: MonitoredEntity) {
        self.state.write().await.entities.insert(entity.id, entity);
    }

    /// Store a job row as-is, replacing any job with the same id.
    pub async fn put_job(&self, job: Job) {
        let mut state = self.state.write().await;
        match state.job_mut(job.id) {
            Some(existing) => *existing = job,
            None => state.jobs.push(job),
        }
    }

    pub async fn all_jobs(&self) -> Vec<Job> {
        self.state.read().await.jobs.clone()
    }

    /// Overwrite an item's status without touching its batch counters.
    #[cfg(test)]
    pub(crate) async fn force_item_status(&self, item_id: Uuid, status: ItemStatus) {
        if let Some(item) = self.state.write().await.item_mut(item_id) {
            item.status = status;
        }
    }

    /// Make the next `n` calls to [`BatchStore::next_batch_to_drain`] fail as
    /// if the database connection had dropped.
    pub fn inject_batch_poll_faults(&self, n: u32) {
        self.batch_poll_faults.store(n, Ordering::SeqCst);
    }

    fn take_batch_poll_fault(&self) -> bool {
        self.batch_poll_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: NewJob, now: Timestamp) -> AppResult<Job> {
        let job = job.into_job(Uuid::new_v4(), now);
        self.state.write().await.jobs.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> AppResult<Option<Job>> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned())
    }

    async fn find_active_job(
        &self,
        entity_id: Uuid,
        job_type: JobType,
    ) -> AppResult<Option<Job>> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .iter()
            .find(|j| {
                j.owner_entity_id == entity_id
                    && j.job_type == job_type
                    && matches!(j.status, JobStatus::Pending | JobStatus::Running)
            })
            .cloned())
    }

    async fn last_completed_job(
        &self,
        entity_id: Uuid,
        job_type: JobType,
    ) -> AppResult<Option<Job>> {
        Ok(self
            .recent_completed_jobs(entity_id, job_type, 1)
            .await?
            .into_iter()
            .next())
    }

    async fn recent_completed_jobs(
        &self,
        entity_id: Uuid,
        job_type: JobType,
        limit: usize,
    ) -> AppResult<Vec<Job>> {
        let state = self.state.read().await;
        let mut completed: Vec<Job> = state
            .jobs
            .iter()
            .filter(|j| {
                j.owner_entity_id == entity_id
                    && j.job_type == job_type
                    && j.status == JobStatus::Completed
            })
            .cloned()
            .collect();

        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        completed.truncate(limit);
        Ok(completed)
    }

    async fn find_stuck_jobs(&self, cutoff: Timestamp) -> AppResult<Vec<Job>> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .iter()
            .filter(|j| {
                j.status == JobStatus::Running && j.started_at.is_some_and(|t| t < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn due_pending_jobs(&self, now: Timestamp, limit: usize) -> AppResult<Vec<Job>> {
        let state = self.state.read().await;
        let mut due: Vec<Job> = state
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending && j.scheduled_at <= now)
            .cloned()
            .collect();

        // Stable sort keeps insertion order among equal keys.
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.scheduled_at.cmp(&b.scheduled_at))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_job(&self, id: Uuid, now: Timestamp) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.job_mut(id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.started_at = Some(now);
                job.progress = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_progress(&self, id: Uuid, progress: u8) -> AppResult<bool> {
        let progress = progress.min(100);
        let mut state = self.state.write().await;
        match state.job_mut(id) {
            Some(job) if job.status == JobStatus::Running && job.progress < progress => {
                job.progress = progress;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_job(
        &self,
        id: Uuid,
        results: &JobResults,
        now: Timestamp,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.job_mut(id) {
            Some(job) if job.status == JobStatus::Running => {
                job.status = JobStatus::Completed;
                job.progress = 100;
                job.results = Some(results.clone());
                job.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_job(&self, id: Uuid, message: &str, now: Timestamp) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.job_mut(id) {
            Some(job) if job.status == JobStatus::Running => {
                job.status = JobStatus::Failed;
                job.error_message = Some(message.to_string());
                job.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_job(&self, id: Uuid, now: Timestamp) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.job_mut(id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn queue_stats(&self) -> AppResult<QueueStats> {
        let state = self.state.read().await;
        let mut counts: HashMap<JobStatus, u64> = HashMap::new();
        for job in &state.jobs {
            *counts.entry(job.status).or_default() += 1;
        }
        Ok(QueueStats::from_counts(counts))
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn create_batch(
        &self,
        owner_id: Uuid,
        payloads: Vec<JsonValue>,
        now: Timestamp,
    ) -> AppResult<Batch> {
        let batch = Batch::new(Uuid::new_v4(), owner_id, payloads.len() as i32, now);
        let items = payloads
            .into_iter()
            .enumerate()
            .map(|(position, payload)| BatchItem::new(batch.id, position as i32, payload, now));

        let mut state = self.state.write().await;
        state.items.extend(items);
        state.batches.push(batch.clone());
        Ok(batch)
    }

    async fn get_batch(&self, id: Uuid) -> AppResult<Option<Batch>> {
        Ok(self
            .state
            .read()
            .await
            .batches
            .iter()
            .find(|b| b.id == id)
            .cloned())
    }

    async fn list_items(&self, batch_id: Uuid) -> AppResult<Vec<BatchItem>> {
        let state = self.state.read().await;
        let mut items: Vec<BatchItem> = state
            .items
            .iter()
            .filter(|i| i.batch_id == batch_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn next_batch_to_drain(&self) -> AppResult<Option<Batch>> {
        if self.take_batch_poll_fault() {
            return Err(AppError::ConnectionPool {
                source: anyhow::anyhow!("connection reset by peer"),
            });
        }

        let state = self.state.read().await;
        let oldest = |status: BatchStatus| state.batches.iter().find(|b| b.status == status);
        Ok(oldest(BatchStatus::Processing)
            .or_else(|| oldest(BatchStatus::Pending))
            .cloned())
    }

    async fn mark_batch_processing(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.batch_mut(id) {
            Some(batch)
                if matches!(batch.status, BatchStatus::Pending | BatchStatus::Processing) =>
            {
                batch.status = BatchStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn drainable_items(&self, batch_id: Uuid) -> AppResult<Vec<BatchItem>> {
        Ok(self
            .list_items(batch_id)
            .await?
            .into_iter()
            .filter(|i| !i.status.is_terminal())
            .collect())
    }

    async fn mark_item_processing(&self, item_id: Uuid, now: Timestamp) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.item_mut(item_id) {
            Some(item) if !item.status.is_terminal() => {
                item.status = ItemStatus::Processing;
                item.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_item(
        &self,
        item_id: Uuid,
        result_ref: &str,
        now: Timestamp,
    ) -> AppResult<Option<Batch>> {
        // One write guard covers item, batch and usage, like the SQL transaction.
        let mut state = self.state.write().await;
        let batch_id = match state.item_mut(item_id) {
            Some(item) if item.status == ItemStatus::Processing => {
                item.status = ItemStatus::Completed;
                item.result_ref = Some(result_ref.to_string());
                item.updated_at = now;
                item.batch_id
            }
            _ => return Ok(None),
        };

        let batch = match state.batch_mut(batch_id) {
            Some(batch) => {
                batch.completed_items += 1;
                batch.clone()
            }
            None => return Err(AppError::not_found("Batch", "id", batch_id)),
        };
        *state.usage.entry(batch.owner_id).or_default() += 1;
        Ok(Some(batch))
    }

    async fn fail_item(
        &self,
        item_id: Uuid,
        error: &str,
        now: Timestamp,
    ) -> AppResult<Option<Batch>> {
        let mut state = self.state.write().await;
        let batch_id = match state.item_mut(item_id) {
            Some(item) if item.status == ItemStatus::Processing => {
                item.status = ItemStatus::Failed;
                item.error = Some(error.to_string());
                item.updated_at = now;
                item.batch_id
            }
            _ => return Ok(None),
        };

        match state.batch_mut(batch_id) {
            Some(batch) => {
                batch.failed_items += 1;
                Ok(Some(batch.clone()))
            }
            None => Err(AppError::not_found("Batch", "id", batch_id)),
        }
    }

    async fn reconcile_batch_counts(&self, id: Uuid) -> AppResult<Option<Batch>> {
        let mut state = self.state.write().await;
        let (completed, failed) = state
            .items
            .iter()
            .filter(|i| i.batch_id == id)
            .fold((0, 0), |(c, f), i| match i.status {
                ItemStatus::Completed => (c + 1, f),
                ItemStatus::Failed => (c, f + 1),
                _ => (c, f),
            });

        match state.batch_mut(id) {
            Some(batch) if batch.status == BatchStatus::Processing => {
                batch.completed_items = completed;
                batch.failed_items = failed;
                Ok(Some(batch.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_batch_progress(&self, id: Uuid, progress: u8) -> AppResult<bool> {
        let progress = progress.min(100);
        let mut state = self.state.write().await;
        match state.batch_mut(id) {
            Some(batch) if batch.progress < progress => {
                batch.progress = progress;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_batch(
        &self,
        id: Uuid,
        status: BatchStatus,
        error: Option<&str>,
        now: Timestamp,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.batch_mut(id) {
            Some(batch) if batch.status == BatchStatus::Processing => {
                batch.status = status;
                batch.error = error.map(str::to_string);
                batch.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn usage_for_owner(&self, owner_id: Uuid) -> AppResult<i64> {
        Ok(self
            .state
            .read()
            .await
            .usage
            .get(&owner_id)
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl EntityDirectory for MemoryStore {
    async fn get_entity(&self, id: Uuid) -> AppResult<Option<MonitoredEntity>> {
        Ok(self.state.read().await.entities.get(&id).cloned())
    }

    async fn list_monitored_entities(&self) -> AppResult<Vec<MonitoredEntity>> {
        let state = self.state.read().await;
        let mut entities: Vec<MonitoredEntity> =
            state.entities.values().filter(|e| e.active).cloned().collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entities)
    }
}
