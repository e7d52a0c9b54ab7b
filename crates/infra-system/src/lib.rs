// Skywatch Infrastructure - System Adapters
// Implements: CommandExecutor, StationFs, WatermarkStore

mod atomic_write;
pub mod local_fs;
pub mod subprocess_executor;
pub mod watermark_file;

pub use local_fs::LocalStationFs;
pub use subprocess_executor::SubprocessExecutor;
pub use watermark_file::FileWatermarkStore;
