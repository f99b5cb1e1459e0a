use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::models::{MonitoredEntity, MonitoredEntityRow};
use crate::repositories::EntityDirectory;
use crate::schema::monitored_entities;

/// Read-only view over `monitored_entities`; the rows are owned elsewhere.
#[derive(Clone)]
pub struct EntityRepository {
    pool: AsyncDbPool,
}

impl EntityRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityDirectory for EntityRepository {
    async fn get_entity(&self, id: Uuid) -> AppResult<Option<MonitoredEntity>> {
        let mut conn = self.pool.get().await.map_err(AppError::from)?;

        let row = monitored_entities::table
            .find(id)
            .select(MonitoredEntityRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(row.map(MonitoredEntity::from))
    }

    async fn list_monitored_entities(&self) -> AppResult<Vec<MonitoredEntity>> {
        let mut conn = self.pool.get().await.map_err(AppError::from)?;

        let rows = monitored_entities::table
            .filter(monitored_entities::active.eq(true))
            .order(monitored_entities::name.asc())
            .select(MonitoredEntityRow::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(rows.into_iter().map(MonitoredEntity::from).collect())
    }
}
