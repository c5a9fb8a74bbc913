//! Domain Constants
//!
//! Fixed lifecycle timings for managed extension servers

use std::time::Duration;

/// A spawned process still alive after this long is considered `Active`
pub const PROBATION_DELAY: Duration = Duration::from_secs(1);

/// Time granted to a process to exit after SIGTERM before SIGKILL
pub const STOP_GRACE_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval at which a stopping process is checked for exit
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time granted to the OS to confirm exit after SIGKILL
pub const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for the stderr drain to reach EOF once the process is gone
pub const STDERR_FLUSH_TIMEOUT: Duration = Duration::from_millis(250);

/// Number of trailing stderr lines retained per process
pub const STDERR_TAIL_LINES: usize = 20;
