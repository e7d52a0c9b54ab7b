// Export Store Port (Interface)
//
// Configurations are owned by the API layer; the core reads them. Tracking
// rows are inserted by the marker and updated by the dispatcher.

use crate::domain::{EntityKind, ExportConfiguration, ExportState, ExportTask, TrackingRow};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for export configurations and tracking rows
#[async_trait]
pub trait ExportStore: Send + Sync {
    /// Insert or replace a configuration
    async fn upsert_configuration(&self, config: &ExportConfiguration) -> Result<()>;

    async fn get_configuration(&self, config_id: &str) -> Result<Option<ExportConfiguration>>;

    async fn list_configurations(&self) -> Result<Vec<ExportConfiguration>>;

    /// Delete a configuration; its tracking rows are cascade-deleted
    async fn delete_configuration(&self, config_id: &str) -> Result<bool>;

    /// Insert a pending tracking row for every local entity matching the
    /// configuration's filter that has no row for this configuration yet
    ///
    /// All-or-nothing per call. Returns the number of rows inserted.
    async fn mark_entities(&self, config: &ExportConfiguration, now_ms: i64) -> Result<u64>;

    /// Atomically select the oldest eligible pending row and claim it
    ///
    /// Eligible: pending, owning configuration enabled, `next_attempt_at <=
    /// now`. Order: `next_attempt_at`, then entity creation, then row id.
    /// Claiming pushes `next_attempt_at` to `now + lease_ms` so concurrent
    /// callers never receive the same row.
    async fn claim_next(&self, now_ms: i64, lease_ms: i64) -> Result<Option<ExportTask>>;

    /// Pending -> Delivered. Returns false if the row no longer exists or is
    /// already terminal.
    async fn record_delivered(&self, tracking_id: i64) -> Result<bool>;

    /// Stay pending with a new attempt count and next attempt time
    async fn record_retry(
        &self,
        tracking_id: i64,
        attempts: i32,
        next_attempt_at_ms: i64,
        error: &str,
    ) -> Result<bool>;

    /// Pending -> Failed (terminal)
    async fn record_failed(&self, tracking_id: i64, attempts: i32, error: &str) -> Result<bool>;

    async fn find_tracking(
        &self,
        kind: EntityKind,
        entity_id: &str,
        config_id: &str,
    ) -> Result<Option<TrackingRow>>;

    async fn count_by_state(&self, config_id: &str, state: ExportState) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{EntityFilter, ExportState, MetadataItem, Observation};
    use crate::port::EntityRepository;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        configs: BTreeMap<String, ExportConfiguration>,
        observations: Vec<Observation>,
        metadata: Vec<MetadataItem>,
        rows: Vec<TrackingRow>,
        next_row_id: i64,
    }

    /// In-memory export store + entity repository
    #[derive(Default)]
    pub struct InMemoryExportStore {
        state: Mutex<State>,
    }

    impl InMemoryExportStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn rows(&self) -> Vec<TrackingRow> {
            self.state.lock().unwrap().rows.clone()
        }
    }

    impl State {
        fn entity_json(&self, kind: EntityKind, id: &str) -> Option<serde_json::Value> {
            match kind {
                EntityKind::Observation => self
                    .observations
                    .iter()
                    .find(|o| o.id == id)
                    .and_then(|o| serde_json::to_value(o).ok()),
                EntityKind::MetadataItem => self
                    .metadata
                    .iter()
                    .find(|m| m.id == id)
                    .and_then(|m| serde_json::to_value(m).ok()),
            }
        }

        fn update_pending(&mut self, id: i64, f: impl FnOnce(&mut TrackingRow)) -> bool {
            match self
                .rows
                .iter_mut()
                .find(|r| r.id == id && r.state == ExportState::Pending)
            {
                Some(row) => {
                    f(row);
                    true
                }
                None => false,
            }
        }
    }

    #[async_trait]
    impl ExportStore for InMemoryExportStore {
        async fn upsert_configuration(&self, config: &ExportConfiguration) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .configs
                .insert(config.config_id.clone(), config.clone());
            Ok(())
        }

        async fn get_configuration(&self, config_id: &str) -> Result<Option<ExportConfiguration>> {
            Ok(self.state.lock().unwrap().configs.get(config_id).cloned())
        }

        async fn list_configurations(&self) -> Result<Vec<ExportConfiguration>> {
            Ok(self.state.lock().unwrap().configs.values().cloned().collect())
        }

        async fn delete_configuration(&self, config_id: &str) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.rows.retain(|r| r.config_id != config_id);
            Ok(state.configs.remove(config_id).is_some())
        }

        async fn mark_entities(&self, config: &ExportConfiguration, now_ms: i64) -> Result<u64> {
            let mut state = self.state.lock().unwrap();
            let kind = config.filter.kind();
            let candidates: Vec<(String, i64)> = match &config.filter {
                EntityFilter::Observations(f) => state
                    .observations
                    .iter()
                    .filter(|o| o.local && f.matches(o))
                    .map(|o| (o.id.clone(), o.created_at_ms))
                    .collect(),
                EntityFilter::Metadata(f) => state
                    .metadata
                    .iter()
                    .filter(|m| m.local && f.matches(m))
                    .map(|m| (m.id.clone(), m.created_at_ms))
                    .collect(),
            };

            let mut inserted = 0;
            for (entity_id, created_at) in candidates {
                let tracked = state.rows.iter().any(|r| {
                    r.kind == kind && r.entity_id == entity_id && r.config_id == config.config_id
                });
                if tracked {
                    continue;
                }
                state.next_row_id += 1;
                let id = state.next_row_id;
                state.rows.push(TrackingRow {
                    id,
                    kind,
                    entity_id,
                    config_id: config.config_id.clone(),
                    state: ExportState::Pending,
                    attempts: 0,
                    next_attempt_at_ms: now_ms,
                    entity_created_at_ms: created_at,
                    last_error: None,
                });
                inserted += 1;
            }
            Ok(inserted)
        }

        async fn claim_next(&self, now_ms: i64, lease_ms: i64) -> Result<Option<ExportTask>> {
            let mut state = self.state.lock().unwrap();
            let configs = state.configs.clone();
            let chosen = state
                .rows
                .iter()
                .filter(|r| r.state == ExportState::Pending && r.next_attempt_at_ms <= now_ms)
                .filter(|r| configs.get(&r.config_id).is_some_and(|c| c.enabled))
                .min_by_key(|r| (r.next_attempt_at_ms, r.entity_created_at_ms, r.id))
                .map(|r| r.id);

            let Some(id) = chosen else {
                return Ok(None);
            };
            let row = state
                .rows
                .iter_mut()
                .find(|r| r.id == id)
                .expect("row selected above");
            row.next_attempt_at_ms = now_ms + lease_ms;
            let row = row.clone();

            let entity = state
                .entity_json(row.kind, &row.entity_id)
                .unwrap_or(serde_json::Value::Null);
            Ok(Some(ExportTask {
                tracking_id: row.id,
                kind: row.kind,
                entity_id: row.entity_id,
                target: configs[&row.config_id].target.clone(),
                config_id: row.config_id,
                attempts: row.attempts,
                entity_created_at_ms: row.entity_created_at_ms,
                entity,
            }))
        }

        async fn record_delivered(&self, tracking_id: i64) -> Result<bool> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .update_pending(tracking_id, |r| r.state = ExportState::Delivered))
        }

        async fn record_retry(
            &self,
            tracking_id: i64,
            attempts: i32,
            next_attempt_at_ms: i64,
            error: &str,
        ) -> Result<bool> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .update_pending(tracking_id, |r| {
                    r.attempts = attempts;
                    r.next_attempt_at_ms = next_attempt_at_ms;
                    r.last_error = Some(error.to_string());
                }))
        }

        async fn record_failed(&self, tracking_id: i64, attempts: i32, error: &str) -> Result<bool> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .update_pending(tracking_id, |r| {
                    r.state = ExportState::Failed;
                    r.attempts = attempts;
                    r.last_error = Some(error.to_string());
                }))
        }

        async fn find_tracking(
            &self,
            kind: EntityKind,
            entity_id: &str,
            config_id: &str,
        ) -> Result<Option<TrackingRow>> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .rows
                .iter()
                .find(|r| r.kind == kind && r.entity_id == entity_id && r.config_id == config_id)
                .cloned())
        }

        async fn count_by_state(&self, config_id: &str, state: ExportState) -> Result<i64> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .rows
                .iter()
                .filter(|r| r.config_id == config_id && r.state == state)
                .count() as i64)
        }
    }

    #[async_trait]
    impl EntityRepository for InMemoryExportStore {
        async fn insert_observation(&self, observation: &Observation) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .observations
                .push(observation.clone());
            Ok(())
        }

        async fn insert_metadata_item(&self, item: &MetadataItem) -> Result<()> {
            self.state.lock().unwrap().metadata.push(item.clone());
            Ok(())
        }

        async fn delete_entity(&self, kind: EntityKind, entity_id: &str) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            let before = state.observations.len() + state.metadata.len();
            match kind {
                EntityKind::Observation => state.observations.retain(|o| o.id != entity_id),
                EntityKind::MetadataItem => state.metadata.retain(|m| m.id != entity_id),
            }
            state
                .rows
                .retain(|r| !(r.kind == kind && r.entity_id == entity_id));
            Ok(state.observations.len() + state.metadata.len() < before)
        }
    }
}
