// Domain Layer - Pure business logic and entities

pub mod clock;
pub mod entity;
pub mod error;
pub mod export;
pub mod job;
pub mod metadata;
pub mod task_group;
pub mod watermark;

// Re-exports
pub use clock::{day_name_from_filename, instant_from_filename, LogicalTime};
pub use entity::{EntityKind, MetadataItem, Observation};
pub use error::DomainError;
pub use export::{
    DeliveryOutcome, EntityFilter, ExportConfiguration, ExportPayload, ExportState, ExportTarget,
    ExportTask, MetadataFilter, ObservationFilter, TrackingRow,
};
pub use job::{Job, JobParams};
pub use metadata::Metadata;
pub use task_group::{
    CommandTemplate, FailurePolicy, TaskGroup, TaskSpec, DEFAULT_COMPLETION_MARGIN_SECS,
    WATERMARK_EPSILON_SECS,
};
pub use watermark::Watermarks;
