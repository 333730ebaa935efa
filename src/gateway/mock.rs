// =============================================================================
// Mock venue adapter — demo mode and tests
// =============================================================================
//
// Fills every order immediately at the requested (or a synthetic) price and
// keeps positions in memory. §9: every new venue wiring must be exercisable
// without live exchange credentials; this is that exercise surface, and is
// also the gateway's fallback target when every real venue is unreachable.
// =============================================================================

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::gateway::adapter::{
    AccountInfo, HealthStatus, OrderKind, OrderRequest, OrderResult, VenueAdapter, VenuePosition,
};
use crate::types::Direction;

struct MockPosition {
    side: Direction,
    size_units: Decimal,
    entry_price: Decimal,
}

pub struct MockAdapter {
    positions: Mutex<HashMap<String, MockPosition>>,
    equity: Mutex<Decimal>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new(dec!(10000))
    }
}

impl MockAdapter {
    pub fn new(starting_equity: Decimal) -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
            equity: Mutex::new(starting_equity),
        }
    }

    fn synthetic_price(request: &OrderRequest) -> Decimal {
        request.limit_price.unwrap_or(dec!(100))
    }
}

#[async_trait]
impl VenueAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_order(&self, request: OrderRequest) -> anyhow::Result<OrderResult> {
        let fill_price = Self::synthetic_price(&request);
        let mut positions = self.positions.lock();

        if request.reduce_only {
            positions.remove(&request.symbol);
        } else {
            positions.insert(
                request.symbol.clone(),
                MockPosition {
                    side: request.side,
                    size_units: request.size_units,
                    entry_price: fill_price,
                },
            );
        }

        Ok(OrderResult {
            success: true,
            broker_order_id: Some(format!("mock-{}", uuid::Uuid::new_v4())),
            fill_price: Some(fill_price),
            fill_size: Some(request.size_units),
            status: "FILLED".to_string(),
            error: None,
        })
    }

    async fn get_account(&self) -> anyhow::Result<AccountInfo> {
        let equity = *self.equity.lock();
        Ok(AccountInfo {
            equity,
            available_balance: equity,
            unrealized_pnl: Decimal::ZERO,
        })
    }

    async fn get_positions(&self) -> anyhow::Result<Vec<VenuePosition>> {
        let positions = self.positions.lock();
        Ok(positions
            .iter()
            .map(|(symbol, pos)| VenuePosition {
                symbol: symbol.clone(),
                side: pos.side,
                size_units: pos.size_units,
                entry_price: pos.entry_price,
                unrealized_pnl: Decimal::ZERO,
                leverage: 1.0,
            })
            .collect())
    }

    async fn close_position(&self, symbol: &str) -> anyhow::Result<OrderResult> {
        self.positions.lock().remove(symbol);
        Ok(OrderResult {
            success: true,
            broker_order_id: Some(format!("mock-close-{}", uuid::Uuid::new_v4())),
            fill_price: None,
            fill_size: None,
            status: "FILLED".to_string(),
            error: None,
        })
    }

    async fn close_all_positions(&self) -> anyhow::Result<Vec<OrderResult>> {
        let symbols: Vec<String> = self.positions.lock().keys().cloned().collect();
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            results.push(self.close_position(&symbol).await?);
        }
        Ok(results)
    }

    async fn cancel_order(&self, _order_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<HealthStatus> {
        Ok(HealthStatus {
            success: true,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_order_opens_a_position_that_get_positions_reports() {
        let adapter = MockAdapter::default();
        adapter
            .send_order(OrderRequest {
                symbol: "BTCUSDT".to_string(),
                side: Direction::Long,
                size_units: dec!(1),
                order_type: OrderKind::Market,
                limit_price: None,
                reduce_only: false,
                post_only: false,
                client_order_id: "c1".to_string(),
            })
            .await
            .unwrap();

        let positions = adapter.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn reduce_only_order_closes_the_position() {
        let adapter = MockAdapter::default();
        adapter
            .send_order(OrderRequest {
                symbol: "BTCUSDT".to_string(),
                side: Direction::Long,
                size_units: dec!(1),
                order_type: OrderKind::Market,
                limit_price: None,
                reduce_only: false,
                post_only: false,
                client_order_id: "c1".to_string(),
            })
            .await
            .unwrap();
        adapter
            .send_order(OrderRequest {
                symbol: "BTCUSDT".to_string(),
                side: Direction::Short,
                size_units: dec!(1),
                order_type: OrderKind::Market,
                limit_price: None,
                reduce_only: true,
                post_only: false,
                client_order_id: "c2".to_string(),
            })
            .await
            .unwrap();

        assert!(adapter.get_positions().await.unwrap().is_empty());
    }
}
