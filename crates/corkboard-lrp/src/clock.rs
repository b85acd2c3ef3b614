//! Time source abstraction for the LRP store.
//!
//! Crash-loop detection compares a record's `since` timestamp against the
//! current time, so every store operation reads time through a [`Clock`].
//! Production code uses [`SystemClock`]; tests pin time with [`FakeClock`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time, in nanoseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> i64;
}

/// Wall-clock time from the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct FakeClock {
    now_ns: AtomicI64,
}

impl FakeClock {
    /// Create a clock pinned at `now_ns` nanoseconds since the epoch.
    pub fn new(now_ns: i64) -> Self {
        Self {
            now_ns: AtomicI64::new(now_ns),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.now_ns.fetch_add(delta.as_nanos() as i64, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ns(&self) -> i64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}
