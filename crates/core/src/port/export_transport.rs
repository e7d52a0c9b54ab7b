// Export Transport Port (remote target collaborator)

use crate::domain::{DeliveryOutcome, ExportPayload, ExportTarget};
use async_trait::async_trait;

/// Pushes one serialized entity to a remote target
///
/// Never fails as a Rust error: every problem is classified into a
/// `DeliveryOutcome` so the dispatcher can decide between retry and give-up.
#[async_trait]
pub trait ExportTransport: Send + Sync {
    async fn push(&self, target: &ExportTarget, payload: &ExportPayload) -> DeliveryOutcome;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns scripted outcomes in order, then a default
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<DeliveryOutcome>>,
        fallback: DeliveryOutcome,
        pushes: Mutex<Vec<(ExportTarget, ExportPayload)>>,
    }

    impl ScriptedTransport {
        pub fn new(fallback: DeliveryOutcome) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback,
                pushes: Mutex::new(Vec::new()),
            }
        }

        pub fn always_delivers() -> Self {
            Self::new(DeliveryOutcome::Delivered)
        }

        pub fn then(self, outcome: DeliveryOutcome) -> Self {
            self.script.lock().unwrap().push_back(outcome);
            self
        }

        pub fn pushes(&self) -> Vec<(ExportTarget, ExportPayload)> {
            self.pushes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExportTransport for ScriptedTransport {
        async fn push(&self, target: &ExportTarget, payload: &ExportPayload) -> DeliveryOutcome {
            self.pushes
                .lock()
                .unwrap()
                .push((target.clone(), payload.clone()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }
}
