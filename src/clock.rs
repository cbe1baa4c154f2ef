//! Wall-clock abstraction
//!
//! All timestamps in the tracing core are Unix milliseconds. Components take
//! an injected [`Clock`] so tests can drive time deterministically instead of
//! sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time source for session and step timestamps
pub trait Clock: Send + Sync + 'static {
    /// Current time as Unix milliseconds
    fn now_millis(&self) -> u64;
}

/// System wall clock (production default)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        current_millis()
    }
}

/// Manually advanced clock for deterministic tests
///
/// # Example
///
/// ```ignore
/// let clock = Arc::new(ManualClock::new(1_000));
/// clock.advance(250);
/// assert_eq!(clock.now_millis(), 1_250);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    /// Move the clock forward by `delta_millis`
    pub fn advance(&self, delta_millis: u64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }

    /// Pin the clock to an absolute time
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Get current time as Unix milliseconds
pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
