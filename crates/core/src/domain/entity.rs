// Locally stored entities that can be exported

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};

/// Kind of exportable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Observation,
    MetadataItem,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Observation => "observation",
            EntityKind::MetadataItem => "metadata_item",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observation" => Ok(EntityKind::Observation),
            "metadata_item" => Ok(EntityKind::MetadataItem),
            other => Err(DomainError::UnknownEntityKind(other.to_string())),
        }
    }
}

/// A detection or image record produced by a processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub camera_id: String,
    pub obs_time_ms: i64,
    pub semantic_type: String,
    pub payload: serde_json::Value,
    /// False for records imported from another station (never re-exported)
    pub local: bool,
    pub created_at_ms: i64,
}

/// A single key/value fact about an observatory at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub id: String,
    pub camera_id: String,
    pub item_time_ms: i64,
    pub key: String,
    pub value: String,
    pub local: bool,
    pub created_at_ms: i64,
}
