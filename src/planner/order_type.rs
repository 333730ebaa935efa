// =============================================================================
// Velocity-keyed order-type decision (§4.2 step 5, §4.2.1 supplement)
// =============================================================================
//
// This decision is taken unconditionally at PREPARE time and must stay
// monotonic in velocity (§8): a velocity increase never moves the decision
// from a more aggressive order type to a less aggressive one
// (POST_ONLY < LIMIT < MARKET).
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Direction, MarketSnapshot, OrderType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VelocityReason {
    HighVelocity,
    MediumVelocity,
    LowVelocity,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderTypeDecision {
    pub order_type: OrderType,
    pub reason: VelocityReason,
    pub limit_price: Option<Decimal>,
}

pub fn decide_order_type(
    velocity: f64,
    direction: Direction,
    snapshot: &MarketSnapshot,
    extreme_velocity_threshold: f64,
    moderate_velocity_threshold: f64,
) -> OrderTypeDecision {
    if velocity > extreme_velocity_threshold {
        OrderTypeDecision {
            order_type: OrderType::Market,
            reason: VelocityReason::HighVelocity,
            limit_price: None,
        }
    } else if velocity > moderate_velocity_threshold {
        OrderTypeDecision {
            order_type: OrderType::Limit,
            reason: VelocityReason::MediumVelocity,
            limit_price: Some(snapshot.aggressive_price(direction)),
        }
    } else {
        OrderTypeDecision {
            order_type: OrderType::PostOnly,
            reason: VelocityReason::LowVelocity,
            limit_price: Some(snapshot.passive_price(direction)),
        }
    }
}

/// Fee analysis attached to `prepared` responses and logged on every CONFIRM
/// (§4.2.1). Advisory only — a negative profit-after-fees never blocks the
/// CONFIRM contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeAnalysis {
    pub maker_fee_pct: f64,
    pub taker_fee_pct: f64,
    pub expected_profit_pct: f64,
    pub maker_profit_after_fees_pct: f64,
    pub taker_profit_after_fees_pct: f64,
}

pub fn analyze_fees(
    entry_price: Decimal,
    nearest_take_profit: Decimal,
    maker_fee_pct: f64,
    taker_fee_pct: f64,
) -> FeeAnalysis {
    let expected_profit_pct = if entry_price.is_zero() {
        0.0
    } else {
        (((nearest_take_profit - entry_price) / entry_price) * Decimal::from(100))
            .to_string()
            .parse::<f64>()
            .unwrap_or(0.0)
    };

    FeeAnalysis {
        maker_fee_pct,
        taker_fee_pct,
        expected_profit_pct,
        maker_profit_after_fees_pct: expected_profit_pct - (maker_fee_pct * 2.0),
        taker_profit_after_fees_pct: expected_profit_pct - (taker_fee_pct * 2.0),
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
    fn high_velocity_selects_market() {
        let decision = decide_order_type(0.006, Direction::Long, &snapshot(), 0.005, 0.001);
        assert_eq!(decision.order_type, OrderType::Market);
        assert_eq!(decision.reason, VelocityReason::HighVelocity);
    }

    #[test]
    fn medium_velocity_selects_aggressive_limit() {
        let decision = decide_order_type(0.002, Direction::Long, &snapshot(), 0.005, 0.001);
        assert_eq!(decision.order_type, OrderType::Limit);
        assert_eq!(decision.limit_price, Some(dec!(50001)));
    }

    #[test]
    fn low_velocity_selects_passive_post_only() {
        let decision = decide_order_type(0.0005, Direction::Long, &snapshot(), 0.005, 0.001);
        assert_eq!(decision.order_type, OrderType::PostOnly);
        assert_eq!(decision.limit_price, Some(dec!(49999)));
    }

    #[test]
    fn decision_is_monotonic_in_velocity() {
        let rank = |v: f64| -> u8 {
            match decide_order_type(v, Direction::Long, &snapshot(), 0.005, 0.001).order_type {
                OrderType::PostOnly => 0,
                OrderType::Limit => 1,
                OrderType::Market => 2,
            }
        };
        let velocities = [0.0001, 0.0005, 0.001, 0.002, 0.005, 0.006, 0.01];
        for w in velocities.windows(2) {
            assert!(rank(w[1]) >= rank(w[0]));
        }
    }
}
