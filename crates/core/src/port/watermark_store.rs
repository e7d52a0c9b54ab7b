// Watermark Store Port

use crate::domain::Watermarks;
use crate::error::Result;
use async_trait::async_trait;

/// Persistent task-group -> instant mapping
///
/// `save` rewrites the whole mapping; there is no append log.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Load all watermarks (empty mapping if nothing was ever saved)
    async fn load(&self) -> Result<Watermarks>;

    /// Atomically replace the stored mapping
    async fn save(&self, watermarks: &Watermarks) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// In-memory store that records every save
    #[derive(Default)]
    pub struct InMemoryWatermarkStore {
        current: Arc<Mutex<Watermarks>>,
        saves: Arc<Mutex<Vec<Watermarks>>>,
    }

    impl InMemoryWatermarkStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(initial: Watermarks) -> Self {
            Self {
                current: Arc::new(Mutex::new(initial)),
                saves: Arc::default(),
            }
        }

        pub fn current(&self) -> Watermarks {
            self.current.lock().unwrap().clone()
        }

        /// Snapshots passed to `save`, oldest first
        pub fn saves(&self) -> Vec<Watermarks> {
            self.saves.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WatermarkStore for InMemoryWatermarkStore {
        async fn load(&self) -> Result<Watermarks> {
            Ok(self.current.lock().unwrap().clone())
        }

        async fn save(&self, watermarks: &Watermarks) -> Result<()> {
            *self.current.lock().unwrap() = watermarks.clone();
            self.saves.lock().unwrap().push(watermarks.clone());
            Ok(())
        }
    }
}
