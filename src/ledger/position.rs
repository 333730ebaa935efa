// =============================================================================
// Position / Fill / TradeRecord — the per-symbol record the Ledger owns
// =============================================================================
//
// Adapted from the single-struct `Position` in the position engine this
// executor's predecessor used, generalised per §3: a Position now carries an
// append-only fill list instead of a single entry price, so volume-weighted
// entry price and venue provenance fall out of the fill list rather than
// being tracked as separate mutable fields.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Direction, ExitReason};

/// A single executed fill against a Position (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: String,
    pub price: Decimal,
    /// Signed quantity: positive adds to the position, negative reduces it.
    pub qty: Decimal,
    pub fee: Decimal,
    pub venue: String,
    pub broker_order_id: String,
    pub timestamp_ms: i64,
}

/// Per-symbol record. Invariant: at most one `Position` exists per symbol at
/// any time (§3, §8) — enforcement lives in `ShadowLedger`, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Direction,
    pub size_units: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profits: Vec<Decimal>,
    pub fills: Vec<Fill>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn notional_usd(&self) -> Decimal {
        self.size_units * self.entry_price
    }

    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        let direction = match self.side {
            Direction::Long => Decimal::ONE,
            Direction::Short => -Decimal::ONE,
        };
        direction * (mark_price - self.entry_price) * self.size_units
    }

    pub fn fees_paid(&self) -> Decimal {
        self.fills.iter().map(|f| f.fee).sum()
    }

    /// Apply a new fill, updating `size_units` and the volume-weighted
    /// `entry_price` from the actually-filled quantity (§4.3 partial-fill
    /// semantics). `qty` is signed: positive grows the position in its
    /// existing direction, negative is a (partial) close.
    pub fn apply_fill(&mut self, fill: Fill) {
        if fill.qty.is_sign_positive() {
            let existing_notional = self.entry_price * self.size_units;
            let new_notional = fill.price * fill.qty;
            let new_size = self.size_units + fill.qty;
            if !new_size.is_zero() {
                self.entry_price = (existing_notional + new_notional) / new_size;
            }
            self.size_units = new_size;
        } else {
            self.size_units += fill.qty;
        }
        self.fills.push(fill);
    }
}

/// Emitted when a Position closes (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl_usd: Decimal,
    pub pnl_pct: Decimal,
    pub duration_ms: i64,
    pub exit_reason: ExitReason,
    pub fee_total: Decimal,
    pub venue: String,
    pub closed_at: DateTime<Utc>,
}

/// Aggregate statistics over a trailing window of `TradeRecord`s (§4.3.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PnlStats {
    pub trade_count: u64,
    pub win_count: u64,
    pub win_rate: f64,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub net_pnl: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub profit_factor: Option<f64>,
}

pub fn calc_pnl_stats(trades: &[TradeRecord]) -> PnlStats {
    let trade_count = trades.len() as u64;
    let mut gross_profit = Decimal::ZERO;
    let mut gross_loss = Decimal::ZERO;
    let mut win_count = 0u64;

    for t in trades {
        if t.pnl_usd.is_sign_positive() && !t.pnl_usd.is_zero() {
            gross_profit += t.pnl_usd;
            win_count += 1;
        } else if t.pnl_usd.is_sign_negative() {
            gross_loss += -t.pnl_usd;
        }
    }

    let net_pnl = gross_profit - gross_loss;
    let win_rate = if trade_count > 0 {
        win_count as f64 / trade_count as f64
    } else {
        0.0
    };
    let loss_count = trade_count - win_count;
    let avg_win = if win_count > 0 {
        gross_profit / Decimal::from(win_count)
    } else {
        Decimal::ZERO
    };
    let avg_loss = if loss_count > 0 {
        gross_loss / Decimal::from(loss_count)
    } else {
        Decimal::ZERO
    };
    let profit_factor = if !gross_loss.is_zero() {
        (gross_profit / gross_loss).to_string().parse::<f64>().ok()
    } else {
        None
    };

    PnlStats {
        trade_count,
        win_count,
        win_rate,
        gross_profit,
        gross_loss,
        net_pnl,
        avg_win,
        avg_loss,
        profit_factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(price: Decimal, qty: Decimal) -> Fill {
        Fill {
            fill_id: "f1".to_string(),
            price,
            qty,
            fee: dec!(0),
            venue: "mock".to_string(),
            broker_order_id: "o1".to_string(),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn apply_fill_computes_volume_weighted_entry_price() {
        let mut pos = Position {
            symbol: "BTCUSDT".to_string(),
            side: Direction::Long,
            size_units: dec!(0),
            entry_price: dec!(0),
            stop_loss: dec!(49000),
            take_profits: vec![dec!(51000)],
            fills: vec![],
            opened_at: Utc::now(),
        };
        pos.apply_fill(fill(dec!(50000), dec!(1)));
        assert_eq!(pos.entry_price, dec!(50000));
        assert_eq!(pos.size_units, dec!(1));

        pos.apply_fill(fill(dec!(51000), dec!(1)));
        // (50000*1 + 51000*1) / 2 = 50500
        assert_eq!(pos.entry_price, dec!(50500));
        assert_eq!(pos.size_units, dec!(2));
    }

    #[test]
    fn partial_close_reduces_size_without_changing_entry_price() {
        let mut pos = Position {
            symbol: "BTCUSDT".to_string(),
            side: Direction::Long,
            size_units: dec!(2),
            entry_price: dec!(50000),
            stop_loss: dec!(49000),
            take_profits: vec![dec!(51000)],
            fills: vec![],
            opened_at: Utc::now(),
        };
        pos.apply_fill(fill(dec!(51000), dec!(-1)));
        assert_eq!(pos.size_units, dec!(1));
        assert_eq!(pos.entry_price, dec!(50000));
    }

    #[test]
    fn fill_accounting_sums_to_zero_on_full_close() {
        let mut pos = Position {
            symbol: "BTCUSDT".to_string(),
            side: Direction::Long,
            size_units: dec!(0),
            entry_price: dec!(0),
            stop_loss: dec!(49000),
            take_profits: vec![dec!(51000)],
            fills: vec![],
            opened_at: Utc::now(),
        };
        pos.apply_fill(fill(dec!(50000), dec!(1)));
        pos.apply_fill(fill(dec!(51000), dec!(-1)));
        let sum: Decimal = pos.fills.iter().map(|f| f.qty).sum();
        assert_eq!(sum, dec!(0));
    }

    #[test]
    fn pnl_stats_profit_factor_and_win_rate() {
        let trades = vec![
            TradeRecord {
                symbol: "BTCUSDT".to_string(),
                direction: Direction::Long,
                entry_price: dec!(50000),
                exit_price: dec!(51000),
                pnl_usd: dec!(100),
                pnl_pct: dec!(2),
                duration_ms: 1000,
                exit_reason: ExitReason::TakeProfit,
                fee_total: dec!(1),
                venue: "mock".to_string(),
                closed_at: Utc::now(),
            },
            TradeRecord {
                symbol: "BTCUSDT".to_string(),
                direction: Direction::Long,
                entry_price: dec!(50000),
                exit_price: dec!(49500),
                pnl_usd: dec!(-50),
                pnl_pct: dec!(-1),
                duration_ms: 1000,
                exit_reason: ExitReason::StopLoss,
                fee_total: dec!(1),
                venue: "mock".to_string(),
                closed_at: Utc::now(),
            },
        ];
        let stats = calc_pnl_stats(&trades);
        assert_eq!(stats.trade_count, 2);
        assert_eq!(stats.win_count, 1);
        assert!((stats.win_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.net_pnl, dec!(50));
        assert!((stats.profit_factor.unwrap() - 2.0).abs() < 0.001);
    }
}
