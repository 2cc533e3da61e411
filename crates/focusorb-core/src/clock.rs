use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source for break expiry (wall clock) and dwell tracking (monotonic).
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time in milliseconds since UNIX epoch
    fn now_ms(&self) -> u64;

    /// Monotonic instant for elapsed-time comparisons
    fn monotonic_now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual clock that only moves when told to
///
/// Both readings advance together, so a test can move wall time and
/// monotonic time in lockstep.
#[derive(Debug)]
pub struct ManualClock {
    start_ms: u64,
    origin: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            start_ms,
            origin: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.offset_ms.fetch_add(by_ms, Ordering::SeqCst);
    }

    /// Move to an absolute wall time; never goes backwards
    pub fn advance_to(&self, now_ms: u64) {
        let target = now_ms.saturating_sub(self.start_ms);
        self.offset_ms.fetch_max(target, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.start_ms + self.offset_ms.load(Ordering::SeqCst)
    }

    fn monotonic_now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_both_readings() {
        let clock = ManualClock::new(1_000);
        let before = clock.monotonic_now();

        clock.advance(Duration::from_secs(2));

        assert_eq!(clock.now_ms(), 3_000);
        assert_eq!(clock.monotonic_now() - before, Duration::from_secs(2));
    }

    #[test]
    fn test_manual_clock_never_goes_backwards() {
        let clock = ManualClock::new(0);
        clock.advance_to(5_000);
        clock.advance_to(1_000);
        assert_eq!(clock.now_ms(), 5_000);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now_ms() > 0);
    }
}
