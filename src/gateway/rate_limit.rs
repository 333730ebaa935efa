// =============================================================================
// Per-venue rate-limit tracker (§4.5.1)
// =============================================================================
//
// Generalised from the predecessor's Binance-specific weight/order-count
// tracker: one instance per venue, still lock-free atomics, still read from
// the venue's own rate-limit response headers where it exposes them, so the
// gateway can refuse to even attempt a call that would trip the venue's own
// limiter rather than let the venue reject it.
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

const WEIGHT_HARD_LIMIT: u32 = 1000;
const WEIGHT_WARN_THRESHOLD: u32 = 800;
const ORDER_10S_LIMIT: u32 = 10;
const ORDER_1D_LIMIT: u32 = 200_000;

pub struct RateLimitTracker {
    venue: String,
    used_weight_1m: AtomicU32,
    order_count_10s: AtomicU32,
    order_count_1d: AtomicU32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub venue: String,
    pub used_weight_1m: u32,
    pub order_count_10s: u32,
    pub order_count_1d: u32,
}

impl RateLimitTracker {
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            used_weight_1m: AtomicU32::new(0),
            order_count_10s: AtomicU32::new(0),
            order_count_1d: AtomicU32::new(0),
        }
    }

    pub fn update_weight(&self, weight: u32) {
        let prev = self.used_weight_1m.swap(weight, Ordering::Relaxed);
        if weight >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(venue = %self.venue, used_weight = weight, "rate-limit weight crossed warning threshold");
        }
    }

    pub fn can_send_request(&self, weight: u32) -> bool {
        let current = self.used_weight_1m.load(Ordering::Relaxed);
        let allowed = current + weight <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(venue = %self.venue, current_weight = current, requested_weight = weight, "request blocked — would exceed rate limit");
        }
        allowed
    }

    pub fn can_place_order(&self) -> bool {
        let count_10s = self.order_count_10s.load(Ordering::Relaxed);
        let count_1d = self.order_count_1d.load(Ordering::Relaxed);
        if count_10s >= ORDER_10S_LIMIT {
            warn!(venue = %self.venue, count_10s, "order blocked — 10s order limit reached");
            return false;
        }
        if count_1d >= ORDER_1D_LIMIT {
            warn!(venue = %self.venue, count_1d, "order blocked — daily order limit reached");
            return false;
        }
        true
    }

    pub fn record_order_sent(&self) {
        self.order_count_10s.fetch_add(1, Ordering::Relaxed);
        self.order_count_1d.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset_10s_counter(&self) {
        self.order_count_10s.store(0, Ordering::Relaxed);
    }

    pub fn reset_daily_counter(&self) {
        self.order_count_1d.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            venue: self.venue.clone(),
            used_weight_1m: self.used_weight_1m.load(Ordering::Relaxed),
            order_count_10s: self.order_count_10s.load(Ordering::Relaxed),
            order_count_1d: self.order_count_1d.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_order_once_10s_limit_reached() {
        let tracker = RateLimitTracker::new("mock");
        for _ in 0..10 {
            assert!(tracker.can_place_order());
            tracker.record_order_sent();
        }
        assert!(!tracker.can_place_order());
    }

    #[test]
    fn refuses_request_that_would_exceed_weight() {
        let tracker = RateLimitTracker::new("mock");
        tracker.update_weight(990);
        assert!(!tracker.can_send_request(50));
        assert!(tracker.can_send_request(5));
    }
}
