use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use jiff::Timestamp;
use jiff_diesel::ToDiesel;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Batch, BatchItem, BatchItemRow, BatchRow, BatchStatus, ItemStatus};
use crate::repositories::BatchStore;
use crate::schema::{batch_items, batches, owner_usage};

#[derive(Clone)]
pub struct BatchRepository {
    pool: AsyncDbPool,
}

impl BatchRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> AppResult<PooledConnection<'_, AsyncPgConnection>> {
        self.pool.get().await.map_err(AppError::from)
    }

    async fn oldest_with_status(
        conn: &mut AsyncPgConnection,
        status: BatchStatus,
    ) -> AppResult<Option<Batch>> {
        let row = batches::table
            .filter(batches::status.eq(status))
            .order(batches::created_at.asc())
            .select(BatchRow::as_select())
            .first(conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(row.map(Batch::from))
    }
}

#[async_trait]
impl BatchStore for BatchRepository {
    async fn create_batch(
        &self,
        owner_id: Uuid,
        payloads: Vec<JsonValue>,
        now: Timestamp,
    ) -> AppResult<Batch> {
        let batch = Batch::new(Uuid::new_v4(), owner_id, payloads.len() as i32, now);
        let batch_row = batch.to_row();
        let item_rows: Vec<_> = payloads
            .into_iter()
            .enumerate()
            .map(|(position, payload)| {
                BatchItem::new(batch.id, position as i32, payload, now).to_row()
            })
            .collect();

        let mut conn = self.conn().await?;
        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                diesel::insert_into(batches::table)
                    .values(&batch_row)
                    .execute(conn)
                    .await?;
                diesel::insert_into(batch_items::table)
                    .values(&item_rows)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(batch)
    }

    async fn get_batch(&self, id: Uuid) -> AppResult<Option<Batch>> {
        let mut conn = self.conn().await?;

        let row = batches::table
            .find(id)
            .select(BatchRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(row.map(Batch::from))
    }

    async fn list_items(&self, batch_id: Uuid) -> AppResult<Vec<BatchItem>> {
        let mut conn = self.conn().await?;

        let rows = batch_items::table
            .filter(batch_items::batch_id.eq(batch_id))
            .order(batch_items::position.asc())
            .select(BatchItemRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(rows.into_iter().map(BatchItem::from).collect())
    }

    async fn next_batch_to_drain(&self) -> AppResult<Option<Batch>> {
        let mut conn = self.conn().await?;

        match Self::oldest_with_status(&mut conn, BatchStatus::Processing).await? {
            Some(batch) => Ok(Some(batch)),
            None => Self::oldest_with_status(&mut conn, BatchStatus::Pending).await,
        }
    }

    async fn mark_batch_processing(&self, id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(
            batches::table
                .filter(batches::id.eq(id))
                .filter(batches::status.eq_any([BatchStatus::Pending, BatchStatus::Processing])),
        )
        .set(batches::status.eq(BatchStatus::Processing))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn drainable_items(&self, batch_id: Uuid) -> AppResult<Vec<BatchItem>> {
        let mut conn = self.conn().await?;

        let rows = batch_items::table
            .filter(batch_items::batch_id.eq(batch_id))
            .filter(batch_items::status.eq_any([ItemStatus::Pending, ItemStatus::Processing]))
            .order(batch_items::position.asc())
            .select(BatchItemRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(rows.into_iter().map(BatchItem::from).collect())
    }

    async fn mark_item_processing(&self, item_id: Uuid, now: Timestamp) -> AppResult<bool> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(
            batch_items::table
                .filter(batch_items::id.eq(item_id))
                .filter(batch_items::status.eq_any([ItemStatus::Pending, ItemStatus::Processing])),
        )
        .set((
            batch_items::status.eq(ItemStatus::Processing),
            batch_items::updated_at.eq(now.to_diesel()),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn complete_item(
        &self,
        item_id: Uuid,
        result_ref: &str,
        now: Timestamp,
    ) -> AppResult<Option<Batch>> {
        let result_ref = result_ref.to_string();
        let now = now.to_diesel();
        let mut conn = self.conn().await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let batch_id: Option<Uuid> = diesel::update(
                    batch_items::table
                        .filter(batch_items::id.eq(item_id))
                        .filter(batch_items::status.eq(ItemStatus::Processing)),
                )
                .set((
                    batch_items::status.eq(ItemStatus::Completed),
                    batch_items::result_ref.eq(&result_ref),
                    batch_items::updated_at.eq(now),
                ))
                .returning(batch_items::batch_id)
                .get_result(conn)
                .await
                .optional()?;

                let Some(batch_id) = batch_id else {
                    return Ok(None);
                };

                let row = diesel::update(batches::table.find(batch_id))
                    .set(batches::completed_items.eq(batches::completed_items + 1))
                    .returning(BatchRow::as_returning())
                    .get_result(conn)
                    .await?;

                diesel::insert_into(owner_usage::table)
                    .values((
                        owner_usage::owner_id.eq(row.owner_id),
                        owner_usage::content_generated.eq(1i64),
                        owner_usage::updated_at.eq(now),
                    ))
                    .on_conflict(owner_usage::owner_id)
                    .do_update()
                    .set((
                        owner_usage::content_generated.eq(owner_usage::content_generated + 1i64),
                        owner_usage::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                Ok(Some(Batch::from(row)))
            }
            .scope_boxed()
        })
        .await
    }

    async fn fail_item(
        &self,
        item_id: Uuid,
        error: &str,
        now: Timestamp,
    ) -> AppResult<Option<Batch>> {
        let error = error.to_string();
        let now = now.to_diesel();
        let mut conn = self.conn().await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let batch_id: Option<Uuid> = diesel::update(
                    batch_items::table
                        .filter(batch_items::id.eq(item_id))
                        .filter(batch_items::status.eq(ItemStatus::Processing)),
                )
                .set((
                    batch_items::status.eq(ItemStatus::Failed),
                    batch_items::error.eq(&error),
                    batch_items::updated_at.eq(now),
                ))
                .returning(batch_items::batch_id)
                .get_result(conn)
                .await
                .optional()?;

                let Some(batch_id) = batch_id else {
                    return Ok(None);
                };

                let row = diesel::update(batches::table.find(batch_id))
                    .set(batches::failed_items.eq(batches::failed_items + 1))
                    .returning(BatchRow::as_returning())
                    .get_result(conn)
                    .await?;

                Ok(Some(Batch::from(row)))
            }
            .scope_boxed()
        })
        .await
    }

    async fn reconcile_batch_counts(&self, id: Uuid) -> AppResult<Option<Batch>> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let count = |status: ItemStatus| {
                    batch_items::table
                        .filter(batch_items::batch_id.eq(id))
                        .filter(batch_items::status.eq(status))
                        .count()
                };
                let completed: i64 = count(ItemStatus::Completed).get_result(conn).await?;
                let failed: i64 = count(ItemStatus::Failed).get_result(conn).await?;

                let row = diesel::update(
                    batches::table
                        .filter(batches::id.eq(id))
                        .filter(batches::status.eq(BatchStatus::Processing)),
                )
                .set((
                    batches::completed_items.eq(i32::try_from(completed).unwrap_or(i32::MAX)),
                    batches::failed_items.eq(i32::try_from(failed).unwrap_or(i32::MAX)),
                ))
                .returning(BatchRow::as_returning())
                .get_result(conn)
                .await
                .optional()?;

                Ok(row.map(Batch::from))
            }
            .scope_boxed()
        })
        .await
    }

    async fn update_batch_progress(&self, id: Uuid, progress: u8) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let progress = i16::from(progress.min(100));

        let updated = diesel::update(
            batches::table
                .filter(batches::id.eq(id))
                .filter(batches::progress.lt(progress)),
        )
        .set(batches::progress.eq(progress))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn finish_batch(
        &self,
        id: Uuid,
        status: BatchStatus,
        error: Option<&str>,
        now: Timestamp,
    ) -> AppResult<bool> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(
            batches::table
                .filter(batches::id.eq(id))
                .filter(batches::status.eq(BatchStatus::Processing)),
        )
        .set((
            batches::status.eq(status),
            batches::error.eq(error),
            batches::completed_at.eq(now.to_diesel()),
        ))
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(updated == 1)
    }

    async fn usage_for_owner(&self, owner_id: Uuid) -> AppResult<i64> {
        let mut conn = self.conn().await?;

        let generated = owner_usage::table
            .find(owner_id)
            .select(owner_usage::content_generated)
            .first::<i64>(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(generated.unwrap_or(0))
    }
}
