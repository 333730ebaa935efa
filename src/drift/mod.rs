// =============================================================================
// Drift Monitor (C7, §4.7)
// =============================================================================
//
// Combines the z-score detector and the flash-crash detector into a single
// state machine: NORMAL -> SAFETY_STOP (z-score breach) or NORMAL -> HARD_KILL
// (flash-crash breach). HARD_KILL dominates SAFETY_STOP — once raised,
// further z-score breaches don't change anything, and only a manual reset
// clears either state. Sampling cadence mirrors the predecessor's exit
// monitor loop (periodic tick, not event-driven).
// =============================================================================

pub mod flash_crash;
pub mod quality;
pub mod zscore;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{error, warn};

pub use flash_crash::{FlashCrashDetector, FlashCrashEvent};
pub use quality::{report_drift, DriftClass, DriftReport};
pub use zscore::ZScoreDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftState {
    Normal,
    SafetyStop,
    HardKill,
}

struct Inner {
    state: DriftState,
    last_flash_crash: Option<FlashCrashEvent>,
}

pub struct DriftMonitor {
    zscore: Mutex<ZScoreDetector>,
    flash_crash: Mutex<FlashCrashDetector>,
    inner: Mutex<Inner>,
}

impl DriftMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        z_ring_capacity: usize,
        z_threshold: f64,
        z_expected_mean: f64,
        z_expected_stddev: f64,
        flash_window_ms: i64,
        flash_velocity_threshold_pct: f64,
    ) -> Self {
        Self {
            zscore: Mutex::new(ZScoreDetector::new(
                z_ring_capacity,
                z_threshold,
                z_expected_mean,
                z_expected_stddev,
            )),
            flash_crash: Mutex::new(FlashCrashDetector::new(flash_window_ms, flash_velocity_threshold_pct)),
            inner: Mutex::new(Inner {
                state: DriftState::Normal,
                last_flash_crash: None,
            }),
        }
    }

    pub fn state(&self) -> DriftState {
        self.inner.lock().state
    }

    /// Feed a completed trade's PnL into the z-score detector. A breach only
    /// raises SAFETY_STOP if the monitor isn't already in HARD_KILL. Returns
    /// `true` exactly on the call that performs that transition, so the
    /// composition root can emit the alert/persist step (§4.7) once per
    /// escalation rather than on every subsequent breached sample.
    pub fn record_trade_pnl(&self, pnl: f64) -> bool {
        let mut z = self.zscore.lock();
        z.record(pnl);
        if z.is_breached() {
            let mut inner = self.inner.lock();
            if inner.state == DriftState::Normal {
                warn!(z_score = ?z.z_score(), "drift monitor raising SAFETY_STOP");
                inner.state = DriftState::SafetyStop;
                return true;
            }
        }
        false
    }

    /// Feed an equity sample into the flash-crash detector. A breach always
    /// escalates to HARD_KILL, overriding SAFETY_STOP. Returns `true` exactly
    /// on the call that performs that transition, so the composition root
    /// knows to invoke `flatten_all` exactly once per escalation (§4.7).
    pub fn observe_equity(&self, equity: Decimal, now_ms: i64) -> bool {
        let event = self.flash_crash.lock().observe(equity, now_ms);
        if let Some(event) = event {
            let mut inner = self.inner.lock();
            let was_hard_kill = inner.state == DriftState::HardKill;
            error!(
                drawdown_pct = event.drawdown_pct,
                velocity_pct_per_min = event.velocity_pct_per_min,
                "drift monitor raising HARD_KILL — flash crash detected"
            );
            inner.state = DriftState::HardKill;
            inner.last_flash_crash = Some(event);
            return !was_hard_kill;
        }
        false
    }

    pub fn last_flash_crash(&self) -> Option<FlashCrashEvent> {
        self.inner.lock().last_flash_crash.clone()
    }

    /// Manual-only reset (§4.7 "reset(new_params?)"): neither SAFETY_STOP nor
    /// HARD_KILL clears on its own. An operator must explicitly call this,
    /// typically after a signed proposal, optionally supplying a fresh
    /// `(expected_mean, expected_stddev)` calibration to replace the one the
    /// z-score detector was built with.
    pub fn reset(&self, reason: &str, new_calibration: Option<(f64, f64)>) {
        let mut inner = self.inner.lock();
        warn!(reason, previous_state = ?inner.state, "drift monitor manually reset");
        inner.state = DriftState::Normal;
        inner.last_flash_crash = None;
        self.zscore.lock().reset(new_calibration);
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.state(), DriftState::SafetyStop | DriftState::HardKill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn monitor() -> DriftMonitor {
        DriftMonitor::new(30, -2.0, 10.0, 5.0, 300_000, 0.02)
    }

    #[test]
    fn starts_normal() {
        let m = monitor();
        assert_eq!(m.state(), DriftState::Normal);
        assert!(!m.is_blocking());
    }

    #[test]
    fn zscore_breach_raises_safety_stop() {
        let m = monitor();
        for _ in 0..10 {
            m.record_trade_pnl(10.0);
        }
        m.record_trade_pnl(-500.0);
        assert_eq!(m.state(), DriftState::SafetyStop);
    }

    #[test]
    fn flash_crash_raises_hard_kill_and_overrides_safety_stop() {
        let m = monitor();
        for _ in 0..10 {
            m.record_trade_pnl(10.0);
        }
        m.record_trade_pnl(-500.0);
        assert_eq!(m.state(), DriftState::SafetyStop);

        m.observe_equity(dec!(10000), 0);
        m.observe_equity(dec!(9000), 10_000);
        assert_eq!(m.state(), DriftState::HardKill);
    }

    #[test]
    fn manual_reset_clears_either_state() {
        let m = monitor();
        m.observe_equity(dec!(10000), 0);
        m.observe_equity(dec!(9000), 10_000);
        assert_eq!(m.state(), DriftState::HardKill);
        m.reset("operator ack", None);
        assert_eq!(m.state(), DriftState::Normal);
    }
}
