// Export marker: enqueue entities for delivery

use crate::error::{AppError, Result};
use crate::port::{ExportStore, TimeProvider};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Inserts pending tracking rows for entities matching a configuration
///
/// Marking is idempotent: an entity already tracked for a configuration, in
/// any state, is never marked again for it.
pub struct ExportMarker {
    store: Arc<dyn ExportStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ExportMarker {
    pub fn new(store: Arc<dyn ExportStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Mark every untracked local entity matching the configuration
    ///
    /// Returns the number of rows inserted. A disabled configuration marks
    /// nothing.
    pub async fn mark(&self, config_id: &str) -> Result<u64> {
        let config = self
            .store
            .get_configuration(config_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("export configuration {}", config_id)))?;

        if !config.enabled {
            debug!(config_id, "Configuration disabled, nothing marked");
            return Ok(0);
        }
        config.validate()?;

        let now = self.time_provider.now_millis();
        let inserted = self.store.mark_entities(&config, now).await?;
        info!(config_id, kind = %config.filter.kind(), inserted, "Entities marked for export");
        Ok(inserted)
    }

    /// Mark for every enabled configuration
    ///
    /// An invalid configuration is logged and skipped; only store failures
    /// abort the pass.
    pub async fn mark_all(&self) -> Result<u64> {
        let mut total = 0;
        for config in self.store.list_configurations().await? {
            if !config.enabled {
                continue;
            }
            if let Err(e) = config.validate() {
                error!(config_id = %config.config_id, error = %e, "Invalid export configuration, skipping");
                continue;
            }
            match self.mark(&config.config_id).await {
                Ok(inserted) => total += inserted,
                // deleted since it was listed
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}
