// Port Layer - Interfaces for external dependencies

pub mod command_executor;
pub mod entity_repository;
pub mod export_store;
pub mod export_transport;
pub mod station_fs;
pub mod time_provider;
pub mod watermark_store;

// Re-exports
pub use command_executor::{
    CommandExecutor, CommandSpec, ExecutionError, ExecutionResult, ExecutionStatus,
};
pub use entity_repository::EntityRepository;
pub use export_store::ExportStore;
pub use export_transport::ExportTransport;
pub use station_fs::{InputFile, StationFs};
pub use time_provider::TimeProvider;
pub use watermark_store::WatermarkStore;
