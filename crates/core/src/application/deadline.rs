// Cooperative deadline passed through a run

use crate::port::TimeProvider;
use std::sync::Arc;

/// Wall-clock budget for one run
///
/// Checked only at coarse points (task-group and batch boundaries, between
/// deliveries); nothing in flight is interrupted.
#[derive(Clone)]
pub struct RunContext {
    deadline_ms: Option<i64>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RunContext {
    pub fn new(deadline_ms: Option<i64>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            deadline_ms,
            time_provider,
        }
    }

    /// No deadline at all
    pub fn unbounded(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::new(None, time_provider)
    }

    pub fn deadline_ms(&self) -> Option<i64> {
        self.deadline_ms
    }

    pub fn now_millis(&self) -> i64 {
        self.time_provider.now_millis()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline_ms
            .is_some_and(|d| self.time_provider.now_millis() > d)
    }

    /// Milliseconds left, `None` if unbounded
    pub fn remaining_ms(&self) -> Option<i64> {
        self.deadline_ms
            .map(|d| (d - self.time_provider.now_millis()).max(0))
    }

    /// True if at least `ms` remain (always true when unbounded)
    pub fn has_at_least(&self, ms: i64) -> bool {
        self.remaining_ms().map_or(true, |left| left >= ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::mocks::ManualTimeProvider;

    #[test]
    fn test_deadline_expiry() {
        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let ctx = RunContext::new(Some(2_000), clock.clone());
        assert!(!ctx.is_expired());
        assert_eq!(ctx.remaining_ms(), Some(1_000));
        assert!(ctx.has_at_least(1_000));

        clock.set(2_001);
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining_ms(), Some(0));
        assert!(!ctx.has_at_least(1));
    }

    #[test]
    fn test_unbounded_never_expires() {
        let ctx = RunContext::unbounded(Arc::new(ManualTimeProvider::new(i64::MAX - 1)));
        assert!(!ctx.is_expired());
        assert!(ctx.has_at_least(i64::MAX));
    }
}
