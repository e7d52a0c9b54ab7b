// Delivery retry policy
use crate::domain::ExportTask;
use tracing::{info, warn};

/// Default delay before the first retry (1 minute)
pub const DEFAULT_BASE_DELAY_MS: i64 = 60_000;

/// Default growth factor per failed attempt
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Default upper bound on a single delay (6 hours)
pub const DEFAULT_MAX_DELAY_MS: i64 = 6 * 60 * 60 * 1000;

/// Default number of transient failures before a row is abandoned
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after this many milliseconds
    Retry(i64),
    /// Attempt budget exhausted
    GiveUp,
}

/// Exponential backoff with bounded, per-row deterministic jitter
///
/// delay = min(base * factor^(attempts - 1) * jitter, max), with jitter in
/// [0.9, 1.1] derived from the tracking row id.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay_ms: i64,
    pub factor: f64,
    pub max_delay_ms: i64,
    pub max_attempts: i32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Decide what happens after a transient failure
    ///
    /// `attempts` is the failure count including the one just observed.
    pub fn on_transient_failure(&self, task: &ExportTask, attempts: i32) -> RetryDecision {
        if attempts >= self.max_attempts {
            warn!(
                tracking_id = task.tracking_id,
                attempts,
                max_attempts = self.max_attempts,
                "Max delivery attempts reached"
            );
            return RetryDecision::GiveUp;
        }

        let delay_ms = self.delay_ms(task.tracking_id, attempts);
        info!(
            tracking_id = task.tracking_id,
            attempts,
            delay_ms,
            "Scheduling delivery retry"
        );
        RetryDecision::Retry(delay_ms)
    }

    /// Delay before the next attempt after `attempts` failures
    pub fn delay_ms(&self, tracking_id: i64, attempts: i32) -> i64 {
        let exponent = (attempts - 1).max(0);
        let raw = self.base_delay_ms as f64 * self.factor.powi(exponent);

        // spreads rows that failed together over +-10%
        let jitter_factor = 0.9 + (tracking_id.rem_euclid(21) as f64 / 100.0);

        ((raw * jitter_factor).min(self.max_delay_ms as f64) as i64).max(0)
    }
}
