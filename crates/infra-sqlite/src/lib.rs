// Skywatch Infrastructure - SQLite Adapter
// Implements: EntityRepository, ExportStore

mod connection;
mod entity_repository;
mod error;
mod export_store;
mod migration;

pub use connection::create_pool;
pub use entity_repository::SqliteEntityRepository;
pub use export_store::SqliteExportStore;
pub use migration::run_migrations;

// sqlx::Error -> AppError goes through `error::map_sqlx_error`: the orphan
// rule keeps us from implementing From<sqlx::Error> for AppError here.
