// =============================================================================
// Daily / weekly drawdown gates (§4.6)
// =============================================================================
//
// Tracks peak equity over a rolling day and a rolling week and trips when the
// drop from peak exceeds the configured fraction. Same peak-tracking idiom as
// the predecessor's risk engine (`peak_equity_today` / `max_drawdown_today`),
// duplicated across two windows and driven by the calendar rather than the
// predecessor's single fixed-capital baseline, since a safety gate over a
// multi-day run has to re-anchor its peak as equity grows.
// =============================================================================

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

pub struct DrawdownGate {
    daily_limit_pct: f64,
    weekly_limit_pct: f64,
    daily_peak: Decimal,
    weekly_peak: Decimal,
    current_day: u32,
    current_week: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DrawdownStatus {
    pub daily_drawdown_pct: f64,
    pub weekly_drawdown_pct: f64,
    pub daily_exceeded: bool,
    pub weekly_exceeded: bool,
}

impl DrawdownGate {
    pub fn new(daily_limit_pct: f64, weekly_limit_pct: f64, starting_equity: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            daily_limit_pct,
            weekly_limit_pct,
            daily_peak: starting_equity,
            weekly_peak: starting_equity,
            current_day: now.ordinal(),
            current_week: now.iso_week().week(),
        }
    }

    /// Feed a new equity reading. Re-anchors the peak when the calendar day
    /// or ISO week rolls over, then recomputes drawdown against each window.
    pub fn observe(&mut self, equity: Decimal, now: DateTime<Utc>) -> DrawdownStatus {
        if now.ordinal() != self.current_day {
            self.current_day = now.ordinal();
            self.daily_peak = equity;
        }
        if now.iso_week().week() != self.current_week {
            self.current_week = now.iso_week().week();
            self.weekly_peak = equity;
        }

        if equity > self.daily_peak {
            self.daily_peak = equity;
        }
        if equity > self.weekly_peak {
            self.weekly_peak = equity;
        }

        let daily_drawdown_pct = drawdown_pct(self.daily_peak, equity);
        let weekly_drawdown_pct = drawdown_pct(self.weekly_peak, equity);

        let daily_exceeded = daily_drawdown_pct >= self.daily_limit_pct;
        let weekly_exceeded = weekly_drawdown_pct >= self.weekly_limit_pct;

        if daily_exceeded {
            warn!(daily_drawdown_pct, limit = self.daily_limit_pct, "daily drawdown gate exceeded");
        }
        if weekly_exceeded {
            warn!(weekly_drawdown_pct, limit = self.weekly_limit_pct, "weekly drawdown gate exceeded");
        }

        DrawdownStatus {
            daily_drawdown_pct,
            weekly_drawdown_pct,
            daily_exceeded,
            weekly_exceeded,
        }
    }
}

fn drawdown_pct(peak: Decimal, current: Decimal) -> f64 {
    if peak.is_zero() {
        return 0.0;
    }
    let drawdown = (peak - current) / peak;
    drawdown.max(Decimal::ZERO).to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn daily_gate_trips_on_five_percent_drop() {
        let mut gate = DrawdownGate::new(0.05, 0.10, dec!(10000), at(2026, 1, 1));
        let status = gate.observe(dec!(9400), at(2026, 1, 1));
        assert!(status.daily_exceeded);
        assert!(!status.weekly_exceeded);
    }

    #[test]
    fn daily_peak_re_anchors_on_day_rollover() {
        let mut gate = DrawdownGate::new(0.05, 0.10, dec!(10000), at(2026, 1, 1));
        gate.observe(dec!(10500), at(2026, 1, 1));
        let status = gate.observe(dec!(10100), at(2026, 1, 2));
        assert!(!status.daily_exceeded);
    }
}
