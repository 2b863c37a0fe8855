//! Monotonic time source shared by registers, the messaging bus and the
//! adaptive controller.
//!
//! Every timestamp in the framework is a millisecond tick count read from a
//! [`Clock`]. Production code uses [`MonotonicClock`]; tests drive time by
//! hand with [`ManualClock`].

use crossbeam_utils::CachePadded;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide epoch so ticks from separate clocks are comparable
static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic millisecond tick source
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Real clock backed by [`Instant`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        PROCESS_EPOCH.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for deterministic timing tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: CachePadded<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: CachePadded::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Shared handle to the default clock
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(MonotonicClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now_ms(), 10);
        clock.advance(25);
        assert_eq!(clock.now_ms(), 35);
        clock.set(5);
        assert_eq!(clock.now_ms(), 5);
    }
}
