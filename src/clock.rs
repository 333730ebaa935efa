// =============================================================================
// Clock — injected time source for deterministic TTL / cooldown / window logic
// =============================================================================
//
// Every component with a wall-clock or monotonic-time invariant (PREPARE TTL,
// circuit-breaker cooldown, daily/weekly drawdown windows, the drift monitor's
// sliding equity window) takes a `Arc<dyn Clock>` at construction instead of
// calling `chrono::Utc::now()` / `Instant::now()` directly. Production wiring
// uses `SystemClock`; tests use `FakeClock` and advance it explicitly so
// boundary instants (e.g. exactly at TTL expiry) are exercised deterministically.
// =============================================================================

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Milliseconds since the Unix epoch and a monotonic counter, both in one
/// trait so callers never reach for `std::time` or `chrono` directly.
pub trait Clock: Send + Sync {
    /// Wall-clock milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Monotonically increasing milliseconds, unrelated to wall-clock jumps.
    /// Used for TTL arithmetic that must never go backwards.
    fn monotonic_ms(&self) -> i64;
}

/// Real clock backed by `chrono` (wall) and a process-start `Instant` (monotonic).
pub struct SystemClock {
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn monotonic_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }
}

/// Test clock. Wall and monotonic time are the same counter, advanced only by
/// explicit calls to `advance`/`set`, never by real time passing.
#[cfg(test)]
pub struct FakeClock {
    millis: AtomicI64,
}

#[cfg(test)]
impl FakeClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn monotonic_ms(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        assert_eq!(clock.monotonic_ms(), 1_500);
    }

    #[test]
    fn system_clock_monotonic_nondecreasing() {
        let clock = SystemClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
    }
}
