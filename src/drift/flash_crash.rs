// =============================================================================
// Flash-crash velocity detector (§4.7)
// =============================================================================
//
// Samples equity every `sample_interval_ms` into a 5-minute sliding window
// and raises HARD_KILL when the drawdown velocity from the window's peak
// exceeds the configured threshold — a fast, large drop, not merely a large
// one. HARD_KILL dominates SAFETY_STOP (§4.7): once raised here, the
// z-score detector's state is irrelevant until a manual reset clears both.
// =============================================================================

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

struct Sample {
    equity: Decimal,
    timestamp_ms: i64,
}

pub struct FlashCrashDetector {
    window_ms: i64,
    velocity_threshold_pct: f64,
    samples: VecDeque<Sample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashCrashEvent {
    pub peak_equity: Decimal,
    pub current_equity: Decimal,
    pub elapsed_ms: i64,
    pub drawdown_pct: f64,
    pub velocity_pct_per_min: f64,
}

impl FlashCrashDetector {
    pub fn new(window_ms: i64, velocity_threshold_pct: f64) -> Self {
        Self {
            window_ms,
            velocity_threshold_pct,
            samples: VecDeque::new(),
        }
    }

    /// Feed a new equity sample and evict anything older than the window.
    /// Fires iff `(peak - current) / peak >= V_THRESHOLD` and the peak
    /// sample is still within the window (§4.7, §8 "Kill determinism") —
    /// the trigger is the plain drawdown fraction, not a per-minute rate;
    /// `velocity_pct_per_min` on the returned event is an observability
    /// figure for the alert payload, not part of the trigger condition.
    pub fn observe(&mut self, equity: Decimal, now_ms: i64) -> Option<FlashCrashEvent> {
        self.samples.push_back(Sample { equity, timestamp_ms: now_ms });
        while let Some(front) = self.samples.front() {
            if now_ms - front.timestamp_ms > self.window_ms {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        let peak = self.samples.iter().map(|s| s.equity).max()?;
        let peak_sample = self.samples.iter().find(|s| s.equity == peak)?;
        let elapsed_ms = now_ms - peak_sample.timestamp_ms;

        if peak.is_zero() || elapsed_ms > self.window_ms {
            return None;
        }

        let drawdown_pct = ((peak - equity) / peak).max(Decimal::ZERO).to_f64().unwrap_or(0.0);
        let elapsed_min = elapsed_ms.max(0) as f64 / 60_000.0;
        let velocity_pct_per_min = if elapsed_min > 0.0 { drawdown_pct / elapsed_min } else { 0.0 };

        if drawdown_pct >= self.velocity_threshold_pct {
            Some(FlashCrashEvent {
                peak_equity: peak,
                current_equity: equity,
                elapsed_ms,
                drawdown_pct,
                velocity_pct_per_min,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn slow_drawdown_does_not_trip() {
        let mut d = FlashCrashDetector::new(300_000, 0.02);
        d.observe(dec!(10000), 0);
        let event = d.observe(dec!(9900), 240_000);
        assert!(event.is_none());
    }

    #[test]
    fn fast_large_drawdown_trips() {
        let mut d = FlashCrashDetector::new(300_000, 0.02);
        d.observe(dec!(10000), 0);
        let event = d.observe(dec!(9000), 10_000);
        assert!(event.is_some());
        let event = event.unwrap();
        assert!(event.velocity_pct_per_min >= 0.02);
    }

    #[test]
    fn scenario_five_literal_values_trip_at_two_point_five_percent() {
        // §8 scenario 5: (10000, 0ms), (10000, 1000ms), (9750, 120000ms) with
        // V_THRESHOLD=2% over a 5-minute window — HARD_KILL fires at
        // t=120000 on a 2.5% drop, well under any per-minute rate reading.
        let mut d = FlashCrashDetector::new(300_000, 0.02);
        assert!(d.observe(dec!(10000), 0).is_none());
        assert!(d.observe(dec!(10000), 1_000).is_none());
        let event = d.observe(dec!(9750), 120_000).expect("2.5% drop within window must trip");
        assert!((event.drawdown_pct - 0.025).abs() < 1e-9);
        assert_eq!(event.elapsed_ms, 120_000);
    }

    #[test]
    fn samples_outside_the_window_are_evicted() {
        let mut d = FlashCrashDetector::new(300_000, 0.02);
        d.observe(dec!(10000), 0);
        d.observe(dec!(9000), 400_000);
        assert_eq!(d.samples.len(), 1);
    }
}
