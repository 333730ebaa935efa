// =============================================================================
// PreparedIntent — the planner's materialised, time-bounded plan (§3)
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Direction, MarketSnapshot, OrderType, Signal};

/// Lifecycle state tracked by the Ledger between `process_intent` and the
/// terminal outcome (§4.3 operations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentState {
    Pending,
    Validated,
    Rejected,
}

/// Materialised on PREPARE, held until CONFIRM/ABORT/expiry (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedIntent {
    pub signal_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_zone: Vec<Decimal>,
    pub stop_loss: Decimal,
    pub take_profits: Vec<Decimal>,
    pub confidence: f64,
    pub leverage: f64,
    pub velocity: f64,

    pub position_size_usd: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub market_snapshot: MarketSnapshot,

    /// Monotonic milliseconds at which this intent was prepared — TTL
    /// arithmetic against `Clock::monotonic_ms()`, never wall-clock.
    pub prepared_at: i64,

    pub state: IntentState,
}

impl PreparedIntent {
    pub fn is_expired(&self, now_monotonic_ms: i64, ttl_ms: i64) -> bool {
        now_monotonic_ms - self.prepared_at > ttl_ms
    }

    /// PENDING placeholder registered the instant a PREPARE arrives, before
    /// sizing or a market snapshot exist (§4.2 step 1). `validate_intent`
    /// overwrites this with the fully-computed intent once steps 2-5 clear.
    pub fn pending_stub(signal: &Signal, prepared_at: i64) -> Self {
        Self {
            signal_id: signal.signal_id.clone(),
            symbol: signal.symbol.clone(),
            direction: signal.direction.unwrap_or(Direction::Long),
            entry_zone: signal.entry_zone.clone(),
            stop_loss: signal.stop_loss.unwrap_or(Decimal::ZERO),
            take_profits: signal.take_profits.clone(),
            confidence: signal.confidence,
            leverage: signal.leverage,
            velocity: signal.velocity,
            position_size_usd: Decimal::ZERO,
            order_type: OrderType::Market,
            limit_price: None,
            market_snapshot: MarketSnapshot {
                best_bid: Decimal::ZERO,
                best_ask: Decimal::ZERO,
                bid_depth: Decimal::ZERO,
                ask_depth: Decimal::ZERO,
                timestamp_ms: 0,
            },
            prepared_at,
            state: IntentState::Pending,
        }
    }

    pub fn from_signal(
        signal: &Signal,
        position_size_usd: Decimal,
        order_type: OrderType,
        limit_price: Option<Decimal>,
        market_snapshot: MarketSnapshot,
        prepared_at: i64,
    ) -> Self {
        Self {
            signal_id: signal.signal_id.clone(),
            symbol: signal.symbol.clone(),
            direction: signal.direction.unwrap_or(Direction::Long),
            entry_zone: signal.entry_zone.clone(),
            stop_loss: signal.stop_loss.unwrap_or(Decimal::ZERO),
            take_profits: signal.take_profits.clone(),
            confidence: signal.confidence,
            leverage: signal.leverage,
            velocity: signal.velocity,
            position_size_usd,
            order_type,
            limit_price,
            market_snapshot,
            prepared_at,
            state: IntentState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            best_bid: dec!(49999),
            best_ask: dec!(50001),
            bid_depth: dec!(10),
            ask_depth: dec!(10),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn expires_strictly_after_ttl() {
        let intent = PreparedIntent {
            signal_id: "s1".to_string(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            entry_zone: vec![],
            stop_loss: dec!(49000),
            take_profits: vec![],
            confidence: 80.0,
            leverage: 1.0,
            velocity: 0.0,
            position_size_usd: dec!(100),
            order_type: OrderType::Limit,
            limit_price: Some(dec!(50000)),
            market_snapshot: snapshot(),
            prepared_at: 0,
            state: IntentState::Pending,
        };
        assert!(!intent.is_expired(10_000, 10_000));
        assert!(intent.is_expired(10_001, 10_000));
    }
}
