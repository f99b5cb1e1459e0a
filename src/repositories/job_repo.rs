use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::AsyncPgConnection;
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::jobs::payload::JobResults;
use crate::models::{Job, JobRow, JobStatus, JobType, NewJob, QueueStats};
use crate::repositories::JobStore;
use crate::schema::jobs;

#[derive(Clone)]
pub struct JobRepository {
    pool: AsyncDbPool,
}

impl JobRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> AppResult<PooledConnection<'_, AsyncPgConnection>> {
        self.pool.get().await.map_err(AppError::from)
    }
}

fn to_jobs(rows: Vec<JobRow>) -> AppResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

#[async_trait]
impl JobStore for JobRepository {
    async fn insert_job(&self, job: NewJob, now: Timestamp) -> AppResult<Job> {
        let mut conn = self.conn().await?;

        let row = diesel::insert_into(jobs::table)
            .values(&job.to_row(Uuid::new_v4(), now))
            .returning(JobRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)?;

        Job::try_from(row)
    }

    async fn get_job(&self, id: Uuid) -> AppResult<Option<Job>> {
        let mut conn = self.conn().await?;

        jobs::table
            .find(id)
            .select(JobRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?
            .map(Job::try_from)
            .transpose()
    }

    async fn find_active_job(
        &self,
        entity_id: Uuid,
        job_type: JobType,
    ) -> AppResult<Option<Job>> {
        let mut conn = self.conn().await?;

        jobs::table
            .filter(jobs::owner_entity_id.eq(entity_id))
            .filter(jobs::job_type.eq(job_type))
            .filter(jobs::status.eq_any([JobStatus::Pending, JobStatus::Running]))
            .select(JobRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?
            .map(Job::try_from)
            .transpose()
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
        let mut conn = self.conn().await?;

        let rows = jobs::table
            .filter(jobs::owner_entity_id.eq(entity_id))
            .filter(jobs::job_type.eq(job_type))
            .filter(jobs::status.eq(JobStatus::Completed))
            .order(jobs::completed_at.desc())
            .limit(limit as i64)
            .select(JobRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        to_jobs(rows)
    }

    async fn find_stuck_jobs(&self, cutoff: Timestamp) -> AppResult<Vec<Job>> {
        let mut conn = self.conn().await?;

        let rows = jobs::table
            .filter(jobs::status.eq(JobStatus::Running))
            .filter(jobs::started_at.lt(cutoff.to_diesel()))
            .select(JobRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        to_jobs(rows)
    }

    async fn due_pending_jobs(&self, now: Timestamp, limit: usize) -> AppResult<Vec<Job>> {
        let mut conn = self.conn().await?;

        let rows = jobs::table
            .filter(jobs::status.eq(JobStatus::Pending))
            .filter(jobs::scheduled_at.le(now.to_diesel()))
            .order((jobs::priority.desc(), jobs::scheduled_at.asc()))
            .limit(limit as i64)
            .select(JobRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        to_jobs(rows)
    }

    async fn claim_job(&self, id: Uuid, now: Timestamp) -> AppResult<bool> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(id))
                .filter(jobs::status.eq(JobStatus::Pending)),
        )
        .set((
            jobs::status.eq(JobStatus::Running),
            jobs::started_at.eq(now.to_diesel()),
            jobs::progress.eq(0i16),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn update_progress(&self, id: Uuid, progress: u8) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let progress = i16::from(progress.min(100));

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(id))
                .filter(jobs::status.eq(JobStatus::Running))
                .filter(jobs::progress.lt(progress)),
        )
        .set(jobs::progress.eq(progress))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn complete_job(
        &self,
        id: Uuid,
        results: &JobResults,
        now: Timestamp,
    ) -> AppResult<bool> {
        let value = results.to_value()?;
        let mut conn = self.conn().await?;

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(id))
                .filter(jobs::status.eq(JobStatus::Running)),
        )
        .set((
            jobs::status.eq(JobStatus::Completed),
            jobs::progress.eq(100i16),
            jobs::results.eq(value),
            jobs::completed_at.eq(now.to_diesel()),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn fail_job(&self, id: Uuid, message: &str, now: Timestamp) -> AppResult<bool> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(id))
                .filter(jobs::status.eq(JobStatus::Running)),
        )
        .set((
            jobs::status.eq(JobStatus::Failed),
            jobs::error_message.eq(message),
            jobs::completed_at.eq(now.to_diesel()),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn cancel_job(&self, id: Uuid, now: Timestamp) -> AppResult<bool> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(id))
                .filter(jobs::status.eq(JobStatus::Pending)),
        )
        .set((
            jobs::status.eq(JobStatus::Cancelled),
            jobs::completed_at.eq(now.to_diesel()),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn queue_stats(&self) -> AppResult<QueueStats> {
        let mut conn = self.conn().await?;

        let counts: Vec<(JobStatus, i64)> = jobs::table
            .group_by(jobs::status)
            .select((jobs::status, diesel::dsl::count_star()))
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(QueueStats::from_counts(
            counts
                .into_iter()
                .map(|(status, count)| (status, count.max(0) as u64)),
        ))
    }
}
