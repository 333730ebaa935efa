// =============================================================================
// Execution-quality drift classes (§4.7.1 supplement)
// =============================================================================
//
// Three observation-only drift classes surfaced for operator dashboards.
// None of these ever escalate the safety state machine on their own — only
// the z-score and flash-crash detectors in this module do that. This is
// deliberately a reporting surface, not another trigger path.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftClass {
    /// Execution price vs. arrival mid-price exceeds a basis-point threshold.
    SpreadCapture,
    /// Elapsed time from decision to exchange acknowledgement exceeds budget.
    Latency,
    /// A configured leader/laggard symbol pair's price divergence exceeds a threshold.
    Correlation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub signal_id: String,
    pub symbol: String,
    pub drift_class: DriftClass,
    pub expected: f64,
    pub actual: f64,
    pub deviation_bps: f64,
    pub timestamp: DateTime<Utc>,
}

/// Classify a single fill's execution quality against its expected baseline.
/// Never returns an escalation — callers attach this to telemetry only, per
/// §4.7.1's explicit non-escalation guarantee.
pub fn report_drift(
    signal_id: impl Into<String>,
    symbol: impl Into<String>,
    drift_class: DriftClass,
    expected: f64,
    actual: f64,
) -> DriftReport {
    let deviation_bps = if expected == 0.0 {
        0.0
    } else {
        ((actual - expected) / expected) * 10_000.0
    };
    DriftReport {
        signal_id: signal_id.into(),
        symbol: symbol.into(),
        drift_class,
        expected,
        actual,
        deviation_bps,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deviation_bps_is_signed() {
        let report = report_drift("s1", "BTCUSDT", DriftClass::Latency, 100.0, 150.0);
        assert!((report.deviation_bps - 5_000.0).abs() < 1e-6);

        let report = report_drift("s2", "BTCUSDT", DriftClass::SpreadCapture, 100.0, 80.0);
        assert!((report.deviation_bps + 2_000.0).abs() < 1e-6);
    }

    #[test]
    fn zero_expected_does_not_divide_by_zero() {
        let report = report_drift("s3", "ETHUSDT", DriftClass::Correlation, 0.0, 10.0);
        assert_eq!(report.deviation_bps, 0.0);
    }
}
