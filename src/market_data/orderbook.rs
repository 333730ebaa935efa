// =============================================================================
// L2 snapshot provider — top-of-book store the planner reads for liquidity
// (re)validation (§4.2 step 3, CONFIRM step 4)
// =============================================================================
//
// Market-data ingestion (the websocket feed that populates this store) is
// out of scope for this crate — the planner only needs a place to read the
// latest snapshot from. This is the predecessor's orderbook manager trimmed
// to exactly that read/write surface, re-typed onto `MarketSnapshot`
// (`Decimal`, not `f64`) and with the depth-stream connection code removed.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::MarketSnapshot;

/// In-memory store of the latest L2 snapshot per symbol. Whatever feeds this
/// crate market data — in-process or via another component — calls `update`;
/// the planner calls `get`.
pub struct L2SnapshotProvider {
    snapshots: RwLock<HashMap<String, MarketSnapshot>>,
}

impl L2SnapshotProvider {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn update(&self, symbol: &str, snapshot: MarketSnapshot) {
        self.snapshots.write().insert(symbol.to_string(), snapshot);
    }

    pub fn get(&self, symbol: &str) -> Option<MarketSnapshot> {
        self.snapshots.read().get(symbol).copied()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.snapshots.read().keys().cloned().collect()
    }
}

impl Default for L2SnapshotProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn update_then_get_round_trips() {
        let provider = L2SnapshotProvider::new();
        assert!(provider.get("BTCUSDT").is_none());

        provider.update(
            "BTCUSDT",
            MarketSnapshot {
                best_bid: dec!(49999),
                best_ask: dec!(50001),
                bid_depth: dec!(10),
                ask_depth: dec!(10),
                timestamp_ms: 1000,
            },
        );

        let snap = provider.get("BTCUSDT").unwrap();
        assert_eq!(snap.best_bid, dec!(49999));
    }
}
