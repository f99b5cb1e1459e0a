//! Persistence boundary for the engine.
//!
//! Every state change is a conditional single-row update keyed by id: the
//! `bool` returned by the mutating methods says whether the row was in the
//! expected state. The only multi-row transaction is [`BatchStore::complete_item`].

mod batch_repo;
mod entity_repo;
mod job_repo;
mod memory;

pub use batch_repo::BatchRepository;
pub use entity_repo::EntityRepository;
pub use job_repo::JobRepository;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::AppResult;
use crate::jobs::payload::JobResults;
use crate::models::{
    Batch, BatchItem, BatchStatus, Job, JobType, MonitoredEntity, NewJob, QueueStats,
};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: NewJob, now: Timestamp) -> AppResult<Job>;

    async fn get_job(&self, id: Uuid) -> AppResult<Option<Job>>;

    /// A `pending` or `running` job of `job_type` for the entity, if any.
    async fn find_active_job(&self, entity_id: Uuid, job_type: JobType)
    -> AppResult<Option<Job>>;

    async fn last_completed_job(
        &self,
        entity_id: Uuid,
        job_type: JobType,
    ) -> AppResult<Option<Job>>;

    /// Most recent `completed` jobs, newest first.
    async fn recent_completed_jobs(
        &self,
        entity_id: Uuid,
        job_type: JobType,
        limit: usize,
    ) -> AppResult<Vec<Job>>;

    /// `running` jobs whose `started_at` is before `cutoff`.
    async fn find_stuck_jobs(&self, cutoff: Timestamp) -> AppResult<Vec<Job>>;

    /// Up to `limit` pending jobs due at `now`, highest priority first, then
    /// earliest `scheduled_at`.
    async fn due_pending_jobs(&self, now: Timestamp, limit: usize) -> AppResult<Vec<Job>>;

    /// `pending -> running` with `started_at = now` and `progress = 0`.
    async fn claim_job(&self, id: Uuid, now: Timestamp) -> AppResult<bool>;

    /// Raise progress of a `running` job; lower or equal values are ignored.
    async fn update_progress(&self, id: Uuid, progress: u8) -> AppResult<bool>;

    /// `running -> completed` with `progress = 100`. Late writes to terminal rows are ignored.
    async fn complete_job(&self, id: Uuid, results: &JobResults, now: Timestamp)
    -> AppResult<bool>;

    /// `running -> failed`. Late writes to terminal rows are ignored.
    async fn fail_job(&self, id: Uuid, message: &str, now: Timestamp) -> AppResult<bool>;

    /// `pending -> cancelled`.
    async fn cancel_job(&self, id: Uuid, now: Timestamp) -> AppResult<bool>;

    async fn queue_stats(&self) -> AppResult<QueueStats>;
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Persist a `pending` batch and its items, positions following `payloads` order.
    async fn create_batch(
        &self,
        owner_id: Uuid,
        payloads: Vec<JsonValue>,
        now: Timestamp,
    ) -> AppResult<Batch>;

    async fn get_batch(&self, id: Uuid) -> AppResult<Option<Batch>>;

    /// All items of a batch in position order.
    async fn list_items(&self, batch_id: Uuid) -> AppResult<Vec<BatchItem>>;

    /// Oldest `processing` batch (resumed after a crash), else oldest `pending`.
    async fn next_batch_to_drain(&self) -> AppResult<Option<Batch>>;

    /// `pending -> processing`; also true when already `processing`.
    async fn mark_batch_processing(&self, id: Uuid) -> AppResult<bool>;

    /// Items not yet settled, in position order.
    async fn drainable_items(&self, batch_id: Uuid) -> AppResult<Vec<BatchItem>>;

    async fn mark_item_processing(&self, item_id: Uuid, now: Timestamp) -> AppResult<bool>;

    /// In one transaction: item `completed` with `result_ref`, batch
    /// `completed_items + 1`, owner `content_generated + 1`. `None` when the
    /// item was already settled.
    async fn complete_item(
        &self,
        item_id: Uuid,
        result_ref: &str,
        now: Timestamp,
    ) -> AppResult<Option<Batch>>;

    /// In one transaction: item `failed` with `error`, batch `failed_items + 1`.
    /// `None` when the item was already settled.
    async fn fail_item(&self, item_id: Uuid, error: &str, now: Timestamp)
    -> AppResult<Option<Batch>>;

    /// Reset a `processing` batch's counters to the settled item statuses.
    /// `None` when the batch is not `processing`.
    async fn reconcile_batch_counts(&self, id: Uuid) -> AppResult<Option<Batch>>;

    /// Raise batch progress; never lowers it.
    async fn update_batch_progress(&self, id: Uuid, progress: u8) -> AppResult<bool>;

    /// `processing -> status` (a terminal status).
    async fn finish_batch(
        &self,
        id: Uuid,
        status: BatchStatus,
        error: Option<&str>,
        now: Timestamp,
    ) -> AppResult<bool>;

    async fn usage_for_owner(&self, owner_id: Uuid) -> AppResult<i64>;
}

#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn get_entity(&self, id: Uuid) -> AppResult<Option<MonitoredEntity>>;

    /// Active entities only.
    async fn list_monitored_entities(&self) -> AppResult<Vec<MonitoredEntity>>;
}

/// The three store handles the engine is built from.
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobStore>,
    pub batches: Arc<dyn BatchStore>,
    pub entities: Arc<dyn EntityDirectory>,
}

impl Repositories {
    /// Postgres-backed stores sharing one pool.
    pub fn postgres(pool: AsyncDbPool) -> Self {
        Self {
            jobs: Arc::new(JobRepository::new(pool.clone())),
            batches: Arc::new(BatchRepository::new(pool.clone())),
            entities: Arc::new(EntityRepository::new(pool)),
        }
    }

    /// Every store backed by the same in-memory instance.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            jobs: store.clone(),
            batches: store.clone(),
            entities: store,
        }
    }
}
