// SQLite EntityRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use skywatch_core::domain::{EntityKind, MetadataItem, Observation};
use skywatch_core::error::Result;
use skywatch_core::port::EntityRepository;
use sqlx::SqlitePool;
use tracing::debug;

pub struct SqliteEntityRepository {
    pool: SqlitePool,
}

impl SqliteEntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityRepository for SqliteEntityRepository {
    async fn insert_observation(&self, observation: &Observation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO observations (
                id, camera_id, obs_time_ms, semantic_type, payload, local, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&observation.id)
        .bind(&observation.camera_id)
        .bind(observation.obs_time_ms)
        .bind(&observation.semantic_type)
        .bind(observation.payload.to_string())
        .bind(observation.local)
        .bind(observation.created_at_ms)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn insert_metadata_item(&self, item: &MetadataItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metadata_items (
                id, camera_id, item_time_ms, key, value, local, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.camera_id)
        .bind(item.item_time_ms)
        .bind(&item.key)
        .bind(&item.value)
        .bind(item.local)
        .bind(item.created_at_ms)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_entity(&self, kind: EntityKind, entity_id: &str) -> Result<bool> {
        let sql = match kind {
            EntityKind::Observation => "DELETE FROM observations WHERE id = ?",
            EntityKind::MetadataItem => "DELETE FROM metadata_items WHERE id = ?",
        };
        let result = sqlx::query(sql)
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(kind = %kind, entity_id, deleted = result.rows_affected(), "Entity delete");
        Ok(result.rows_affected() > 0)
    }
}

/// observations row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ObservationRow {
    id: String,
    camera_id: String,
    obs_time_ms: i64,
    semantic_type: String,
    payload: String,
    local: bool,
    created_at_ms: i64,
}

impl ObservationRow {
    pub(crate) fn into_observation(self) -> Observation {
        let payload = serde_json::from_str(&self.payload).unwrap_or(serde_json::json!({}));
        Observation {
            id: self.id,
            camera_id: self.camera_id,
            obs_time_ms: self.obs_time_ms,
            semantic_type: self.semantic_type,
            payload,
            local: self.local,
            created_at_ms: self.created_at_ms,
        }
    }
}

/// metadata_items row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MetadataItemRow {
    id: String,
    camera_id: String,
    item_time_ms: i64,
    key: String,
    value: String,
    local: bool,
    created_at_ms: i64,
}

impl MetadataItemRow {
    pub(crate) fn into_item(self) -> MetadataItem {
        MetadataItem {
            id: self.id,
            camera_id: self.camera_id,
            item_time_ms: self.item_time_ms,
            key: self.key,
            value: self.value,
            local: self.local,
            created_at_ms: self.created_at_ms,
        }
    }
}
