// =============================================================================
// Partial-fill state machine — chase vs cancel decision (§4.3, §9)
// =============================================================================
//
// §9 design note: "Callback hell in fill handling -> a small state machine
// (REQUESTED -> PARTIAL -> CHASING -> COMPLETE | CANCELLED) driven by gateway
// events." This module is that state machine plus the fill-ratio arithmetic
// from §4.3 and scenario 6 of §8.
// =============================================================================

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    Requested,
    Partial,
    Chasing,
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaseDecision {
    Chase,
    Cancel,
    Wait,
}

/// Tracks one order's fill progress against its originally requested size.
pub struct PartialFillTracker {
    pub requested: Decimal,
    pub filled: Decimal,
    pub state: FillState,
    pub first_fill_at_ms: Option<i64>,
}

impl PartialFillTracker {
    pub fn new(requested: Decimal) -> Self {
        Self {
            requested,
            filled: Decimal::ZERO,
            state: FillState::Requested,
            first_fill_at_ms: None,
        }
    }

    pub fn fill_ratio(&self) -> Decimal {
        if self.requested.is_zero() {
            return Decimal::ZERO;
        }
        self.filled / self.requested
    }

    pub fn remaining(&self) -> Decimal {
        self.requested - self.filled
    }

    /// Record an additional fill and decide whether to chase the remainder
    /// or cancel it, per §4.3:
    ///   fill_ratio < 0.5 and elapsed > 5s  -> cancel remainder
    ///   fill_ratio >= 0.5                  -> chase remainder at touch
    ///   otherwise                          -> wait
    pub fn record_fill(&mut self, qty: Decimal, now_ms: i64) -> ChaseDecision {
        if self.first_fill_at_ms.is_none() {
            self.first_fill_at_ms = Some(now_ms);
        }
        self.filled += qty;

        if self.remaining() <= Decimal::ZERO {
            self.state = FillState::Complete;
            return ChaseDecision::Wait;
        }

        self.state = FillState::Partial;
        let elapsed = now_ms - self.first_fill_at_ms.unwrap_or(now_ms);
        let ratio = self.fill_ratio();

        if ratio < Decimal::new(5, 1) && elapsed > 5_000 {
            self.state = FillState::Cancelled;
            ChaseDecision::Cancel
        } else if ratio >= Decimal::new(5, 1) {
            self.state = FillState::Chasing;
            ChaseDecision::Chase
        } else {
            ChaseDecision::Wait
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fill_ratio_above_half_chases() {
        let mut tracker = PartialFillTracker::new(dec!(1.0));
        let decision = tracker.record_fill(dec!(0.6), 1_000);
        assert_eq!(decision, ChaseDecision::Chase);
        assert_eq!(tracker.remaining(), dec!(0.4));
        assert_eq!(tracker.state, FillState::Chasing);
    }

    #[test]
    fn fill_ratio_below_half_waits_until_five_seconds_elapsed() {
        let mut tracker = PartialFillTracker::new(dec!(1.0));
        let decision = tracker.record_fill(dec!(0.2), 0);
        assert_eq!(decision, ChaseDecision::Wait);

        // Still below half, but only 4s elapsed via a fresh zero-size fill probe.
        let decision = tracker.record_fill(dec!(0.0), 4_000);
        assert_eq!(decision, ChaseDecision::Wait);

        let decision = tracker.record_fill(dec!(0.0), 5_001);
        assert_eq!(decision, ChaseDecision::Cancel);
        assert_eq!(tracker.state, FillState::Cancelled);
    }

    #[test]
    fn full_fill_completes() {
        let mut tracker = PartialFillTracker::new(dec!(1.0));
        let decision = tracker.record_fill(dec!(1.0), 0);
        assert_eq!(decision, ChaseDecision::Wait);
        assert_eq!(tracker.state, FillState::Complete);
        assert_eq!(tracker.remaining(), dec!(0));
    }
}
