// Worker and queue administration constants (no magic values)
use std::time::Duration;

/// Sleep duration when the queue has nothing due (100ms)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep duration after an engine error before claiming again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Concurrency every worker starts with
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Maximum jobs removed by one `clean` call
pub const CLEAN_BATCH_LIMIT: u32 = 1000;

/// Retention applied by `clean`: finished jobs are eligible immediately
pub const CLEAN_GRACE_MS: i64 = 0;

/// Pause between completion barrier polling rounds (1s)
pub const BARRIER_POLL_INTERVAL: Duration = Duration::from_secs(1);
