// Admission control and worker constants (no magic values)
use std::time::Duration;

/// Fixed prefix for every lock and counter key
pub const KEY_PREFIX: &str = "throttle";

/// Key purpose: per-queue reservation lock
pub const LOCK_PURPOSE: &str = "lock";

/// Key purpose: per-queue throughput counter
pub const RATE_LIMIT_PURPOSE: &str = "rate_limit";

/// Key purpose: per-queue in-flight counter
pub const ACTIVE_JOBS_PURPOSE: &str = "active_jobs";

/// Expiry of the reservation lock (30s)
/// Only bounds how long a crashed holder can block a queue
pub const LOCK_TTL: Duration = Duration::from_secs(30);

/// Sleep duration when no jobs are available (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a failed reservation cycle before the next one (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// How long a running job may keep going after shutdown is requested (10s)
pub const SHUTDOWN_GRACE_DURATION: Duration = Duration::from_secs(10);
