// Export Domain Model
//
// Export configurations describe which entities go to which remote target;
// tracking rows record per-(entity, configuration) delivery state.

use crate::domain::entity::{EntityKind, MetadataItem, Observation};
use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Filter over observations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<String>,
}

/// Filter over observatory metadata items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

fn in_window(t: i64, after: Option<i64>, before: Option<i64>) -> bool {
    after.map_or(true, |a| t >= a) && before.map_or(true, |b| t <= b)
}

fn camera_allowed(camera_id: &str, camera_ids: &Option<Vec<String>>) -> bool {
    camera_ids
        .as_ref()
        .map_or(true, |ids| ids.iter().any(|c| c == camera_id))
}

impl ObservationFilter {
    pub fn matches(&self, obs: &Observation) -> bool {
        camera_allowed(&obs.camera_id, &self.camera_ids)
            && in_window(obs.obs_time_ms, self.after_ms, self.before_ms)
            && self
                .semantic_type
                .as_ref()
                .map_or(true, |t| *t == obs.semantic_type)
    }
}

impl MetadataFilter {
    pub fn matches(&self, item: &MetadataItem) -> bool {
        camera_allowed(&item.camera_id, &self.camera_ids)
            && in_window(item.item_time_ms, self.after_ms, self.before_ms)
            && self.key.as_ref().map_or(true, |k| *k == item.key)
    }
}

/// Predicate over entity kind + attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityFilter {
    Observations(ObservationFilter),
    Metadata(MetadataFilter),
}

impl EntityFilter {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityFilter::Observations(_) => EntityKind::Observation,
            EntityFilter::Metadata(_) => EntityKind::MetadataItem,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (camera_ids, after, before) = match self {
            EntityFilter::Observations(f) => (&f.camera_ids, f.after_ms, f.before_ms),
            EntityFilter::Metadata(f) => (&f.camera_ids, f.after_ms, f.before_ms),
        };
        if matches!(camera_ids, Some(ids) if ids.is_empty()) {
            return Err(DomainError::ValidationError(
                "camera_ids, if given, must contain at least one ID".to_string(),
            ));
        }
        if let (Some(after), Some(before)) = (after, before) {
            if before < after {
                return Err(DomainError::ValidationError(
                    "before_ms cannot be earlier than after_ms".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Remote target with credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTarget {
    pub url: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for ExportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportTarget")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// A named, filterable rule describing what to push where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfiguration {
    pub config_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub filter: EntityFilter,
    pub target: ExportTarget,
    pub enabled: bool,
}

impl ExportConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.config_id.is_empty() {
            return Err(DomainError::ValidationError("config_id is empty".to_string()));
        }
        if self.target.url.is_empty() {
            return Err(DomainError::ValidationError(format!(
                "export configuration {} has no target URL",
                self.config_id
            )));
        }
        self.filter.validate()
    }
}

/// Delivery state of a tracking row
///
/// Stored as an integer: positive = pending, zero = delivered, negative =
/// permanently failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportState {
    Pending,
    Delivered,
    Failed,
}

impl ExportState {
    pub fn code(&self) -> i64 {
        match self {
            ExportState::Pending => 1,
            ExportState::Delivered => 0,
            ExportState::Failed => -1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            c if c > 0 => ExportState::Pending,
            0 => ExportState::Delivered,
            _ => ExportState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExportState::Pending)
    }

    /// Validate a transition; nothing leaves a terminal state
    pub fn transition(self, to: ExportState) -> Result<ExportState> {
        if self.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        Ok(to)
    }
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportState::Pending => write!(f, "PENDING"),
            ExportState::Delivered => write!(f, "DELIVERED"),
            ExportState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Durable delivery record of one entity for one configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRow {
    pub id: i64,
    pub kind: EntityKind,
    pub entity_id: String,
    pub config_id: String,
    pub state: ExportState,
    pub attempts: i32,
    pub next_attempt_at_ms: i64,
    pub entity_created_at_ms: i64,
    pub last_error: Option<String>,
}

/// A claimed delivery, bound to everything needed to perform it
#[derive(Debug, Clone)]
pub struct ExportTask {
    pub tracking_id: i64,
    pub kind: EntityKind,
    pub entity_id: String,
    pub config_id: String,
    pub target: ExportTarget,
    /// Failed attempts so far
    pub attempts: i32,
    pub entity_created_at_ms: i64,
    /// Serialized entity as stored at claim time
    pub entity: serde_json::Value,
}

impl ExportTask {
    pub fn payload(&self) -> ExportPayload {
        ExportPayload {
            kind: self.kind,
            entity_id: self.entity_id.clone(),
            entity: self.entity.clone(),
        }
    }
}

/// Wire representation pushed to a remote target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub kind: EntityKind,
    pub entity_id: String,
    pub entity: serde_json::Value,
}

/// Result of one delivery attempt as classified by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Network or remote-server trouble; retried with backoff
    Transient(String),
    /// Remote rejected the payload or the credentials; never retried
    Permanent(String),
}
