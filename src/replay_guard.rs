// =============================================================================
// Replay Guard (C4) — idempotency filter keyed on (signal_id, kind)
// =============================================================================
//
// Pure keyed set with TTL eviction; no dependencies on any other component
// (§2 dependency order). Degrades to a fixed-capacity in-memory LRU when the
// configured TTL map would otherwise grow unbounded under sustained traffic —
// eviction order falls back to least-recently-inserted once capacity is hit.
//
// Resolved open question (§4.4, §9): this guard is memory-only. It does not
// persist across restart; idempotency across a restart is recovered from the
// Venue Gateway's signed-order log (see `gateway::order_log`), not from a
// replayed fingerprint set.
// =============================================================================

use std::collections::VecDeque;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::types::SignalKind;

/// 32-byte fingerprint derived deterministically from `(signal_id, kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalFingerprint([u8; 32]);

impl SignalFingerprint {
    pub fn new(signal_id: &str, kind: SignalKind) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(signal_id.as_bytes());
        hasher.update([kind as u8]);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Fresh,
    Duplicate,
}

struct Entry {
    fingerprint: SignalFingerprint,
    inserted_at: i64,
}

struct Inner {
    order: VecDeque<Entry>,
    capacity: usize,
    ttl_ms: i64,
}

/// Bounded, TTL-evicted fingerprint set guarding against duplicate
/// PREPARE/CONFIRM/ABORT processing (§4.4).
pub struct ReplayGuard {
    inner: Mutex<Inner>,
    clock: std::sync::Arc<dyn Clock>,
}

impl ReplayGuard {
    pub fn new(ttl_ms: i64, capacity: usize, clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                ttl_ms,
            }),
            clock,
        }
    }

    /// Register `fingerprint`. Returns `Fresh` the first time within the TTL
    /// window, `Duplicate` on any subsequent attempt before expiry.
    pub fn register(&self, fingerprint: SignalFingerprint) -> RegisterOutcome {
        let now = self.clock.monotonic_ms();
        let mut inner = self.inner.lock();

        Self::evict_expired(&mut inner, now);

        if inner.order.iter().any(|e| e.fingerprint == fingerprint) {
            return RegisterOutcome::Duplicate;
        }

        if inner.order.len() >= inner.capacity {
            inner.order.pop_front();
        }

        inner.order.push_back(Entry {
            fingerprint,
            inserted_at: now,
        });

        RegisterOutcome::Fresh
    }

    fn evict_expired(inner: &mut Inner, now: i64) {
        let ttl = inner.ttl_ms;
        while let Some(front) = inner.order.front() {
            if now - front.inserted_at > ttl {
                inner.order.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::Arc;

    fn guard(ttl_ms: i64, capacity: usize) -> (ReplayGuard, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(0));
        let guard = ReplayGuard::new(ttl_ms, capacity, clock.clone());
        (guard, clock)
    }

    #[test]
    fn first_registration_is_fresh_second_is_duplicate() {
        let (guard, _clock) = guard(60_000, 100);
        let fp = SignalFingerprint::new("sig-1", SignalKind::Prepare);
        assert_eq!(guard.register(fp), RegisterOutcome::Fresh);
        assert_eq!(guard.register(fp), RegisterOutcome::Duplicate);
    }

    #[test]
    fn different_kind_is_a_different_fingerprint() {
        let (guard, _clock) = guard(60_000, 100);
        let prepare = SignalFingerprint::new("sig-1", SignalKind::Prepare);
        let confirm = SignalFingerprint::new("sig-1", SignalKind::Confirm);
        assert_ne!(prepare, confirm);
        assert_eq!(guard.register(prepare), RegisterOutcome::Fresh);
        assert_eq!(guard.register(confirm), RegisterOutcome::Fresh);
    }

    #[test]
    fn expires_after_ttl() {
        let (guard, clock) = guard(1_000, 100);
        let fp = SignalFingerprint::new("sig-1", SignalKind::Prepare);
        assert_eq!(guard.register(fp), RegisterOutcome::Fresh);
        clock.advance(1_001);
        assert_eq!(guard.register(fp), RegisterOutcome::Fresh);
    }

    #[test]
    fn evicts_oldest_when_capacity_exceeded() {
        let (guard, _clock) = guard(60_000, 2);
        let a = SignalFingerprint::new("a", SignalKind::Prepare);
        let b = SignalFingerprint::new("b", SignalKind::Prepare);
        let c = SignalFingerprint::new("c", SignalKind::Prepare);
        assert_eq!(guard.register(a), RegisterOutcome::Fresh);
        assert_eq!(guard.register(b), RegisterOutcome::Fresh);
        assert_eq!(guard.register(c), RegisterOutcome::Fresh);
        assert_eq!(guard.len(), 2);
        // `a` was evicted to make room for `c`, so it registers fresh again.
        assert_eq!(guard.register(a), RegisterOutcome::Fresh);
    }
}
