// SQLite ExportStore Implementation

use crate::entity_repository::{MetadataItemRow, ObservationRow};
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use skywatch_core::domain::{
    EntityFilter, EntityKind, ExportConfiguration, ExportState, ExportTarget, ExportTask,
    TrackingRow,
};
use skywatch_core::error::{AppError, Result};
use skywatch_core::port::ExportStore;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

/// Table, tracking FK column and time column per entity kind
fn kind_columns(kind: EntityKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        EntityKind::Observation => ("observations", "observation_id", "obs_time_ms"),
        EntityKind::MetadataItem => ("metadata_items", "metadata_id", "item_time_ms"),
    }
}

/// SQL predicate on `state` for a delivery state
fn state_predicate(state: ExportState) -> &'static str {
    match state {
        ExportState::Pending => "state > 0",
        ExportState::Delivered => "state = 0",
        ExportState::Failed => "state < 0",
    }
}

pub struct SqliteExportStore {
    pool: SqlitePool,
}

impl SqliteExportStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append the configuration's filter to a query over `e`
    fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &EntityFilter) {
        let (_, _, time_col) = kind_columns(filter.kind());
        let (camera_ids, after_ms, before_ms) = match filter {
            EntityFilter::Observations(f) => (f.camera_ids.clone(), f.after_ms, f.before_ms),
            EntityFilter::Metadata(f) => (f.camera_ids.clone(), f.after_ms, f.before_ms),
        };

        if let Some(ids) = camera_ids {
            qb.push(" AND e.camera_id IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");
        }
        if let Some(after) = after_ms {
            qb.push(format!(" AND e.{} >= ", time_col)).push_bind(after);
        }
        if let Some(before) = before_ms {
            qb.push(format!(" AND e.{} <= ", time_col)).push_bind(before);
        }
        match filter {
            EntityFilter::Observations(f) => {
                if let Some(semantic_type) = &f.semantic_type {
                    qb.push(" AND e.semantic_type = ")
                        .push_bind(semantic_type.clone());
                }
            }
            EntityFilter::Metadata(f) => {
                if let Some(key) = &f.key {
                    qb.push(" AND e.key = ").push_bind(key.clone());
                }
            }
        }
    }
}

#[async_trait]
impl ExportStore for SqliteExportStore {
    async fn upsert_configuration(&self, config: &ExportConfiguration) -> Result<()> {
        let filter = serde_json::to_string(&config.filter)?;

        sqlx::query(
            r#"
            INSERT INTO export_configs (
                config_id, name, description, entity_kind, filter,
                target_url, target_user, target_password, enabled
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(config_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                entity_kind = excluded.entity_kind,
                filter = excluded.filter,
                target_url = excluded.target_url,
                target_user = excluded.target_user,
                target_password = excluded.target_password,
                enabled = excluded.enabled
            "#,
        )
        .bind(&config.config_id)
        .bind(&config.name)
        .bind(&config.description)
        .bind(config.filter.kind().as_str())
        .bind(&filter)
        .bind(&config.target.url)
        .bind(&config.target.user)
        .bind(&config.target.password)
        .bind(config.enabled)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get_configuration(&self, config_id: &str) -> Result<Option<ExportConfiguration>> {
        let row = sqlx::query_as::<_, ConfigRow>("SELECT * FROM export_configs WHERE config_id = ?")
            .bind(config_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ConfigRow::into_configuration).transpose()
    }

    async fn list_configurations(&self) -> Result<Vec<ExportConfiguration>> {
        let rows = sqlx::query_as::<_, ConfigRow>("SELECT * FROM export_configs ORDER BY config_id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(ConfigRow::into_configuration).collect()
    }

    async fn delete_configuration(&self, config_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM export_configs WHERE config_id = ?")
            .bind(config_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_entities(&self, config: &ExportConfiguration, now_ms: i64) -> Result<u64> {
        let kind = config.filter.kind();
        let (table, fk_col, _) = kind_columns(kind);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT OR IGNORE INTO export_tracking \
             (config_id, entity_kind, {fk}, state, attempts, next_attempt_at, entity_created_at) \
             SELECT ",
            fk = fk_col
        ));
        qb.push_bind(config.config_id.clone())
            .push(", ")
            .push_bind(kind.as_str())
            .push(", e.id, ")
            .push_bind(ExportState::Pending.code())
            .push(", 0, ")
            .push_bind(now_ms)
            .push(format!(", e.created_at_ms FROM {} e WHERE e.local = 1", table))
            .push(format!(
                " AND NOT EXISTS (SELECT 1 FROM export_tracking t WHERE t.{} = e.id AND t.config_id = ",
                fk_col
            ))
            .push_bind(config.config_id.clone())
            .push(")");
        Self::push_filter(&mut qb, &config.filter);

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let result = qb
            .build()
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(
            config_id = %config.config_id,
            inserted = result.rows_affected(),
            "Tracking rows inserted"
        );
        Ok(result.rows_affected())
    }

    async fn claim_next(&self, now_ms: i64, lease_ms: i64) -> Result<Option<ExportTask>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Single UPDATE: SQLite serializes writers, so two claimers can never
        // select the same row.
        let claimed = sqlx::query_as::<_, TrackingRecord>(
            r#"
            UPDATE export_tracking
            SET next_attempt_at = ?
            WHERE id = (
                SELECT t.id FROM export_tracking t
                JOIN export_configs c ON c.config_id = t.config_id
                WHERE t.state > 0 AND c.enabled = 1 AND t.next_attempt_at <= ?
                ORDER BY t.next_attempt_at ASC, t.entity_created_at ASC, t.id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now_ms + lease_ms)
        .bind(now_ms)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(record) = claimed else {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(None);
        };
        let row = record.into_row()?;

        let config = sqlx::query_as::<_, ConfigRow>("SELECT * FROM export_configs WHERE config_id = ?")
            .bind(&row.config_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .into_configuration()?;

        let entity = match row.kind {
            EntityKind::Observation => {
                let obs = sqlx::query_as::<_, ObservationRow>(
                    "SELECT * FROM observations WHERE id = ?",
                )
                .bind(&row.entity_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
                serde_json::to_value(obs.into_observation())?
            }
            EntityKind::MetadataItem => {
                let item = sqlx::query_as::<_, MetadataItemRow>(
                    "SELECT * FROM metadata_items WHERE id = ?",
                )
                .bind(&row.entity_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
                serde_json::to_value(item.into_item())?
            }
        };

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(ExportTask {
            tracking_id: row.id,
            kind: row.kind,
            entity_id: row.entity_id,
            config_id: row.config_id,
            target: config.target,
            attempts: row.attempts,
            entity_created_at_ms: row.entity_created_at_ms,
            entity,
        }))
    }

    async fn record_delivered(&self, tracking_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE export_tracking SET state = ? WHERE id = ? AND state > 0")
            .bind(ExportState::Delivered.code())
            .bind(tracking_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_retry(
        &self,
        tracking_id: i64,
        attempts: i32,
        next_attempt_at_ms: i64,
        error: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE export_tracking
            SET attempts = ?, next_attempt_at = ?, last_error = ?
            WHERE id = ? AND state > 0
            "#,
        )
        .bind(attempts)
        .bind(next_attempt_at_ms)
        .bind(error)
        .bind(tracking_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failed(&self, tracking_id: i64, attempts: i32, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE export_tracking
            SET state = ?, attempts = ?, last_error = ?
            WHERE id = ? AND state > 0
            "#,
        )
        .bind(ExportState::Failed.code())
        .bind(attempts)
        .bind(error)
        .bind(tracking_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_tracking(
        &self,
        kind: EntityKind,
        entity_id: &str,
        config_id: &str,
    ) -> Result<Option<TrackingRow>> {
        let (_, fk_col, _) = kind_columns(kind);
        let sql = format!(
            "SELECT * FROM export_tracking WHERE {} = ? AND config_id = ?",
            fk_col
        );
        let record = sqlx::query_as::<_, TrackingRecord>(&sql)
            .bind(entity_id)
            .bind(config_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        record.map(TrackingRecord::into_row).transpose()
    }

    async fn count_by_state(&self, config_id: &str, state: ExportState) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM export_tracking WHERE config_id = ? AND {}",
            state_predicate(state)
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(config_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

/// export_configs row
#[derive(Debug, sqlx::FromRow)]
struct ConfigRow {
    config_id: String,
    name: String,
    description: String,
    #[allow(dead_code)]
    entity_kind: String,
    filter: String,
    target_url: String,
    target_user: String,
    target_password: String,
    enabled: bool,
}

impl ConfigRow {
    fn into_configuration(self) -> Result<ExportConfiguration> {
        let filter: EntityFilter = serde_json::from_str(&self.filter)?;
        Ok(ExportConfiguration {
            config_id: self.config_id,
            name: self.name,
            description: self.description,
            filter,
            target: ExportTarget {
                url: self.target_url,
                user: self.target_user,
                password: self.target_password,
            },
            enabled: self.enabled,
        })
    }
}

/// export_tracking row
#[derive(Debug, sqlx::FromRow)]
struct TrackingRecord {
    id: i64,
    config_id: String,
    entity_kind: String,
    observation_id: Option<String>,
    metadata_id: Option<String>,
    state: i64,
    attempts: i32,
    next_attempt_at: i64,
    entity_created_at: i64,
    last_error: Option<String>,
}

impl TrackingRecord {
    fn into_row(self) -> Result<TrackingRow> {
        let kind: EntityKind = self.entity_kind.parse()?;
        let entity_id = match kind {
            EntityKind::Observation => self.observation_id,
            EntityKind::MetadataItem => self.metadata_id,
        }
        .ok_or_else(|| {
            AppError::InvalidState(format!("tracking row {} has no {} reference", self.id, kind))
        })?;

        Ok(TrackingRow {
            id: self.id,
            kind,
            entity_id,
            config_id: self.config_id,
            state: ExportState::from_code(self.state),
            attempts: self.attempts,
            next_attempt_at_ms: self.next_attempt_at,
            entity_created_at_ms: self.entity_created_at,
            last_error: self.last_error,
        })
    }
}
