// Entity Repository Port (relational store collaborator)

use crate::domain::{EntityKind, MetadataItem, Observation};
use crate::error::Result;
use async_trait::async_trait;

/// Point inserts/deletes for exportable entities
#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn insert_observation(&self, observation: &Observation) -> Result<()>;

    async fn insert_metadata_item(&self, item: &MetadataItem) -> Result<()>;

    /// Delete an entity; its tracking rows go with it
    async fn delete_entity(&self, kind: EntityKind, entity_id: &str) -> Result<bool>;
}
