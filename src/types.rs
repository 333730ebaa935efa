// =============================================================================
// Shared data model — Signal envelope, order/exit enums, L2 market snapshot
// =============================================================================
//
// Types shared across the transport, planner, ledger and gateway. Money and
// price fields use `rust_decimal::Decimal`, not `f64` — a PnL ledger that
// accumulates rounding error across thousands of fills is not acceptable in a
// capital-safety system. Ratio/statistical quantities (confidence, velocity,
// leverage, basis-point thresholds) remain `f64`.
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Long or short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "LONG")]
    Long,
    #[serde(rename = "SHORT")]
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// The three-phase signal protocol (§1, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Prepare,
    Confirm,
    Abort,
}

/// Order submission mode, chosen from signal velocity (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    PostOnly,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::PostOnly => write!(f, "POST_ONLY"),
        }
    }
}

/// Why a Position closed (§3 TradeRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Manual,
    SafetyStop,
    FlashCrashProtection,
    Abort,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TakeProfit => "TAKE_PROFIT",
            Self::StopLoss => "STOP_LOSS",
            Self::Manual => "MANUAL",
            Self::SafetyStop => "SAFETY_STOP",
            Self::FlashCrashProtection => "FLASH_CRASH_PROTECTION",
            Self::Abort => "ABORT",
        };
        write!(f, "{}", s)
    }
}

/// The unit transported on the fast path (§3 Signal).
///
/// CONFIRM/ABORT messages only populate `signal_id`, `kind`, `symbol`,
/// `timestamp`; every other field carries a default so a minimal message
/// still deserialises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub kind: SignalKind,
    pub symbol: String,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub entry_zone: Vec<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profits: Vec<Decimal>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default)]
    pub velocity: f64,
    #[serde(default)]
    pub trap_type: Option<String>,
    pub timestamp: i64,
}

fn default_leverage() -> f64 {
    1.0
}

impl Signal {
    pub fn validate_opaque_id(&self) -> bool {
        !self.signal_id.is_empty() && self.signal_id.len() <= 100
    }
}

/// Top-of-book snapshot used for liquidity (re)validation (§4.2 step 3/4.2
/// CONFIRM step 4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub bid_depth: Decimal,
    pub ask_depth: Decimal,
    pub timestamp_ms: i64,
}

impl MarketSnapshot {
    pub fn spread_bps(&self) -> f64 {
        let mid = (self.best_bid + self.best_ask) / Decimal::from(2);
        if mid.is_zero() {
            return 0.0;
        }
        let spread = self.best_ask - self.best_bid;
        (spread / mid * Decimal::from(10_000))
            .to_string()
            .parse::<f64>()
            .unwrap_or(0.0)
    }

    pub fn aggressive_price(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Long => self.best_ask,
            Direction::Short => self.best_bid,
        }
    }

    pub fn passive_price(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Long => self.best_bid,
            Direction::Short => self.best_ask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn spread_bps_computed_from_mid() {
        let snap = MarketSnapshot {
            best_bid: dec!(49999),
            best_ask: dec!(50001),
            bid_depth: dec!(1),
            ask_depth: dec!(1),
            timestamp_ms: 0,
        };
        assert!((snap.spread_bps() - 0.4).abs() < 0.01);
    }

    #[test]
    fn aggressive_price_is_ask_for_long_bid_for_short() {
        let snap = MarketSnapshot {
            best_bid: dec!(100),
            best_ask: dec!(101),
            bid_depth: dec!(1),
            ask_depth: dec!(1),
            timestamp_ms: 0,
        };
        assert_eq!(snap.aggressive_price(Direction::Long), dec!(101));
        assert_eq!(snap.aggressive_price(Direction::Short), dec!(100));
        assert_eq!(snap.passive_price(Direction::Long), dec!(100));
        assert_eq!(snap.passive_price(Direction::Short), dec!(101));
    }

    #[test]
    fn signal_id_length_bound() {
        let mut signal = Signal {
            signal_id: "a".repeat(101),
            kind: SignalKind::Prepare,
            symbol: "BTCUSDT".to_string(),
            direction: Some(Direction::Long),
            entry_zone: vec![],
            stop_loss: None,
            take_profits: vec![],
            confidence: 80.0,
            leverage: 1.0,
            velocity: 0.0,
            trap_type: None,
            timestamp: 0,
        };
        assert!(!signal.validate_opaque_id());
        signal.signal_id = "ok".to_string();
        assert!(signal.validate_opaque_id());
    }
}
