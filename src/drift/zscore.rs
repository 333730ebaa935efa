// =============================================================================
// PnL z-score drift detector (§4.7)
// =============================================================================
//
// Ring buffer of the last `capacity` (default 30) trade PnLs. Once at least
// 5 samples are present, computes `z = (mean(ring) - expected_mean) /
// expected_stddev` against a pre-registered calibration baseline — not a
// self-referential statistic of the ring alone, since the whole point is to
// detect the live strategy drifting away from the distribution it was
// calibrated on. Crossing the threshold (default -2.0, strictly below) raises
// SAFETY_STOP. This state only ever clears on a manual operator reset, which
// may also replace the calibration baseline (§4.7 "reset(new_params?)").
// =============================================================================

use std::collections::VecDeque;

pub struct ZScoreDetector {
    capacity: usize,
    threshold: f64,
    expected_mean: f64,
    expected_stddev: f64,
    samples: VecDeque<f64>,
}

impl ZScoreDetector {
    pub fn new(capacity: usize, threshold: f64, expected_mean: f64, expected_stddev: f64) -> Self {
        Self {
            capacity,
            threshold,
            expected_mean,
            expected_stddev,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, pnl: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(pnl);
    }

    /// Returns the current z-score of the ring's mean against the
    /// pre-registered calibration baseline, or `None` if fewer than 5
    /// samples have been recorded yet (§4.7).
    pub fn z_score(&self) -> Option<f64> {
        if self.samples.len() < 5 {
            return None;
        }
        if self.expected_stddev == 0.0 {
            return None;
        }
        let n = self.samples.len() as f64;
        let mean = self.samples.iter().sum::<f64>() / n;
        Some((mean - self.expected_mean) / self.expected_stddev)
    }

    /// §4.7: "If z < Z_THRESHOLD ... and not already in SAFETY_STOP" — the
    /// comparison is strict, matching a genuine drift below baseline rather
    /// than merely touching it.
    pub fn is_breached(&self) -> bool {
        self.z_score().map(|z| z < self.threshold).unwrap_or(false)
    }

    /// Manual recovery (§4.7, §9 "reset(new_params?)"): clears the ring and
    /// optionally replaces the calibration baseline with a freshly supplied
    /// one, leaving the threshold itself untouched.
    pub fn reset(&mut self, new_calibration: Option<(f64, f64)>) {
        self.samples.clear();
        if let Some((mean, stddev)) = new_calibration {
            self.expected_mean = mean;
            self.expected_stddev = stddev;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_five_samples_reports_no_score() {
        let mut d = ZScoreDetector::new(30, -2.0, 10.0, 5.0);
        d.record(10.0);
        d.record(-5.0);
        assert!(d.z_score().is_none());
        assert!(!d.is_breached());
    }

    #[test]
    fn mean_drifting_below_calibrated_baseline_breaches_the_threshold() {
        // calibrated on a strategy that expects mean +10 with stddev 5;
        // five straight -20 trades gives a ring mean of -20, z = -6.0.
        let mut d = ZScoreDetector::new(30, -2.0, 10.0, 5.0);
        for _ in 0..5 {
            d.record(-20.0);
        }
        let z = d.z_score().unwrap();
        assert!((z - (-6.0)).abs() < 1e-9);
        assert!(d.is_breached());
    }

    #[test]
    fn ring_mean_matching_calibration_does_not_breach() {
        let mut d = ZScoreDetector::new(30, -2.0, 10.0, 5.0);
        for _ in 0..10 {
            d.record(10.0);
        }
        assert_eq!(d.z_score(), Some(0.0));
        assert!(!d.is_breached());
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let mut d = ZScoreDetector::new(3, -2.0, 0.0, 1.0);
        d.record(1.0);
        d.record(2.0);
        d.record(3.0);
        d.record(4.0);
        assert_eq!(d.samples.len(), 3);
        assert_eq!(d.samples.front().copied(), Some(2.0));
    }

    #[test]
    fn reset_clears_ring_and_can_replace_calibration() {
        let mut d = ZScoreDetector::new(30, -2.0, 10.0, 5.0);
        for _ in 0..5 {
            d.record(-20.0);
        }
        assert!(d.is_breached());

        d.reset(Some((-20.0, 5.0)));
        assert!(d.z_score().is_none());
        for _ in 0..5 {
            d.record(-20.0);
        }
        assert_eq!(d.z_score(), Some(0.0));
        assert!(!d.is_breached());
    }
}
