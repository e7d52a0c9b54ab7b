// Dispatcher constants
use std::time::Duration;

/// Sleep when nothing is eligible for delivery (5s)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_secs(5);

/// Sleep after a store error before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// How long a claimed row stays invisible to other dispatchers (5 minutes)
///
/// Must exceed the transport timeout; a dispatcher that dies mid-delivery
/// releases its row when the lease runs out.
pub const DEFAULT_CLAIM_LEASE_MS: i64 = 5 * 60 * 1000;
