//! Nullable clock: deterministic time for testing.

use braid_types::{Clock, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to. Shareable across tasks.
pub struct NullClock {
    millis: AtomicU64,
}

impl NullClock {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            millis: AtomicU64::new(initial.as_millis()),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Timestamp::from_secs(secs))
    }

    /// Advance time by `by`.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the time to a specific value.
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

impl Default for NullClock {
    fn default() -> Self {
        Self::new(Timestamp::EPOCH)
    }
}
