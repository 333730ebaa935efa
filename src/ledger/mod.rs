// =============================================================================
// Shadow-State Ledger (C3)
// =============================================================================
//
// Authoritative in-memory record of prepared intents, open positions and
// closed-trade history (§4.3). All mutation paths go through one
// `parking_lot::Mutex` guarding the whole state — the single-writer
// discipline §5 requires is enforced by construction, not by convention:
// exactly one task at a time can be inside a `&mut LedgerState` borrow.
//
// Grounded on the predecessor's `PositionManager` (open/closed position
// lists behind locks, `open_position`/`close_position` life-cycle,
// `get_open_positions`), generalised with the PreparedIntent stage and the
// fill-list/volume-weighted entry price this spec's Position model requires.
// =============================================================================

pub mod intent;
pub mod partial_fill;
pub mod position;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::types::{Direction, ExitReason};

pub use intent::{IntentState, PreparedIntent};
pub use position::{calc_pnl_stats, Fill, PnlStats, Position, TradeRecord};

struct LedgerState {
    intents: HashMap<String, PreparedIntent>,
    positions: HashMap<String, Position>,
    closed: Vec<TradeRecord>,
}

/// `{equity_usd, timestamp_ms}` — accumulated by C7's sliding window.
#[derive(Debug, Clone, Copy)]
pub struct EquitySnapshot {
    pub equity_usd: Decimal,
    pub timestamp_ms: i64,
}

pub struct ShadowLedger {
    state: parking_lot::Mutex<LedgerState>,
    clock: Arc<dyn Clock>,
}

impl ShadowLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: parking_lot::Mutex::new(LedgerState {
                intents: HashMap::new(),
                positions: HashMap::new(),
                closed: Vec::new(),
            }),
            clock,
        }
    }

    /// Absent -> PENDING (§4.3).
    pub fn process_intent(&self, intent: PreparedIntent) {
        let mut state = self.state.lock();
        info!(signal_id = %intent.signal_id, symbol = %intent.symbol, "intent registered (PENDING)");
        state.intents.insert(intent.signal_id.clone(), intent);
    }

    /// Overwrite the PENDING stub with the fully-computed intent (sizing,
    /// order type, market snapshot resolved) and mark it VALIDATED (§4.2
    /// step 6).
    pub fn validate_intent(&self, mut intent: PreparedIntent) {
        intent.state = IntentState::Validated;
        let mut state = self.state.lock();
        info!(signal_id = %intent.signal_id, symbol = %intent.symbol, "intent validated");
        state.intents.insert(intent.signal_id.clone(), intent);
    }

    pub fn reject_intent(&self, signal_id: &str, reason: &str) {
        let mut state = self.state.lock();
        if let Some(intent) = state.intents.get_mut(signal_id) {
            intent.state = IntentState::Rejected;
            warn!(signal_id, reason, "intent rejected");
        }
        state.intents.remove(signal_id);
    }

    pub fn get_intent(&self, signal_id: &str) -> Option<PreparedIntent> {
        self.state.lock().intents.get(signal_id).cloned()
    }

    pub fn remove_intent(&self, signal_id: &str) -> Option<PreparedIntent> {
        self.state.lock().intents.remove(signal_id)
    }

    /// Sweep all PreparedIntents older than `ttl_ms` (§4.2 stale-intent
    /// sweeper). Returns the signal_ids removed, for `STALE_INTENT_CLEANUP`
    /// reporting by the caller.
    pub fn sweep_stale_intents(&self, ttl_ms: i64) -> Vec<String> {
        let now = self.clock.monotonic_ms();
        let mut state = self.state.lock();
        let stale: Vec<String> = state
            .intents
            .iter()
            .filter(|(_, intent)| intent.is_expired(now, ttl_ms))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            state.intents.remove(id);
        }
        stale
    }

    /// Creates or augments a Position using the *actually* filled size
    /// (§4.3 `confirm_execution`). `stop_loss`/`take_profits` seed a
    /// brand-new Position; they are ignored when a position for `symbol`
    /// already exists, since those levels were fixed at that position's
    /// own CONFIRM.
    ///
    /// A reducing fill (opposite sign to the position's side) that brings
    /// `size_units` to exactly zero closes the position here rather than
    /// leaving a zero-size Position sitting in the map — flat is not a
    /// state the at-most-one-position invariant (§8) distinguishes from
    /// absent. The exit reason for this path is always `Manual`: which of
    /// TAKE_PROFIT/STOP_LOSS applied is a strategy-layer judgement this
    /// core does not receive (§1 "higher-level strategy logic... out of
    /// scope"); a safety-driven close goes through `close_position`
    /// directly with its own reason instead.
    pub fn confirm_execution(
        &self,
        symbol: &str,
        side: Direction,
        stop_loss: Decimal,
        take_profits: Vec<Decimal>,
        fill: Fill,
    ) -> Option<TradeRecord> {
        let mut state = self.state.lock();
        let entry = state.positions.entry(symbol.to_string()).or_insert_with(|| Position {
            symbol: symbol.to_string(),
            side,
            size_units: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            stop_loss,
            take_profits,
            fills: vec![],
            opened_at: Utc::now(),
        });
        let venue = fill.venue.clone();
        entry.apply_fill(fill);
        info!(symbol, size_units = %entry.size_units, entry_price = %entry.entry_price, "position confirmed/augmented");

        if entry.size_units.is_zero() {
            let position = state.positions.remove(symbol)?;
            let duration_ms = self.clock.now_ms() - position.opened_at.timestamp_millis();
            let fee_total = position.fees_paid();
            let exit_price = position.fills.last().map(|f| f.price).unwrap_or(position.entry_price);
            let pnl: Decimal = position.fills.iter().map(|f| -(f.price * f.qty)).sum::<Decimal>() - fee_total;
            let pnl_pct = if !position.entry_price.is_zero() {
                pnl / (position.entry_price * position.size_units.abs().max(Decimal::ONE)) * Decimal::from(100)
            } else {
                Decimal::ZERO
            };
            let record = TradeRecord {
                symbol: symbol.to_string(),
                direction: position.side,
                entry_price: position.entry_price,
                exit_price,
                pnl_usd: pnl,
                pnl_pct,
                duration_ms,
                exit_reason: ExitReason::Manual,
                fee_total,
                venue,
                closed_at: Utc::now(),
            };
            info!(symbol, pnl_usd = %pnl, "position flattened by reducing fill");
            state.closed.push(record.clone());
            return Some(record);
        }
        None
    }

    /// Explicit open, used when a CONFIRM creates a position from scratch
    /// with stop-loss/take-profit already known (§4.3 `open_position`).
    pub fn open_position(&self, position: Position) {
        let mut state = self.state.lock();
        state.positions.insert(position.symbol.clone(), position);
    }

    /// Close a single symbol's position, producing exactly one TradeRecord
    /// (§3, §4.3, §8 at-most-one/fill-accounting properties).
    pub fn close_position(
        &self,
        symbol: &str,
        exit_price: Decimal,
        reason: ExitReason,
        venue: String,
    ) -> Option<TradeRecord> {
        let mut state = self.state.lock();
        let position = state.positions.remove(symbol)?;

        let pnl = position.unrealized_pnl(exit_price);
        let pnl_pct = if !position.entry_price.is_zero() {
            (exit_price - position.entry_price) / position.entry_price * Decimal::from(100)
        } else {
            Decimal::ZERO
        };
        let duration_ms = self.clock.now_ms() - position.opened_at.timestamp_millis();
        let fee_total = position.fees_paid();

        let record = TradeRecord {
            symbol: symbol.to_string(),
            direction: position.side,
            entry_price: position.entry_price,
            exit_price,
            pnl_usd: pnl,
            pnl_pct,
            duration_ms,
            exit_reason: reason,
            fee_total,
            venue,
            closed_at: Utc::now(),
        };

        info!(symbol, pnl_usd = %pnl, reason = %reason, "position closed");
        state.closed.push(record.clone());
        Some(record)
    }

    /// Atomic sweep producing one TradeRecord per symbol (§4.3
    /// `close_all_positions`). `price_lookup` resolves a symbol to its
    /// current mark price; symbols with no resolvable price are skipped and
    /// logged, not silently dropped.
    pub fn close_all_positions(
        &self,
        reason: ExitReason,
        venue: &str,
        price_lookup: impl Fn(&str) -> Option<Decimal>,
    ) -> Vec<TradeRecord> {
        let symbols: Vec<String> = {
            let state = self.state.lock();
            state.positions.keys().cloned().collect()
        };

        let mut records = Vec::new();
        for symbol in symbols {
            match price_lookup(&symbol) {
                Some(price) => {
                    if let Some(record) = self.close_position(&symbol, price, reason, venue.to_string()) {
                        records.push(record);
                    }
                }
                None => {
                    warn!(symbol, "close_all_positions: no mark price available, skipping");
                }
            }
        }
        records
    }

    pub fn get_position(&self, symbol: &str) -> Option<Position> {
        self.state.lock().positions.get(symbol).cloned()
    }

    pub fn get_all_positions(&self) -> Vec<Position> {
        self.state.lock().positions.values().cloned().collect()
    }

    pub fn position_count(&self) -> usize {
        self.state.lock().positions.len()
    }

    pub fn calc_pnl_stats_over(&self, days: i64) -> PnlStats {
        let now = self.clock.now_ms();
        let window_ms = days * 24 * 60 * 60 * 1000;
        let state = self.state.lock();
        let trades: Vec<TradeRecord> = state
            .closed
            .iter()
            .filter(|t| now - t.closed_at.timestamp_millis() <= window_ms)
            .cloned()
            .collect();
        calc_pnl_stats(&trades)
    }

    /// Current equity estimate: sum of each open position's unrealised PnL
    /// against `price_lookup`, plus `available_balance` supplied by the
    /// caller (typically the venue gateway's `get_account`).
    pub fn equity_snapshot(
        &self,
        available_balance: Decimal,
        price_lookup: impl Fn(&str) -> Option<Decimal>,
    ) -> EquitySnapshot {
        let state = self.state.lock();
        let unrealized: Decimal = state
            .positions
            .values()
            .filter_map(|p| price_lookup(&p.symbol).map(|mark| p.unrealized_pnl(mark)))
            .sum();
        EquitySnapshot {
            equity_usd: available_balance + unrealized,
            timestamp_ms: self.clock.now_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::types::{Direction, MarketSnapshot, OrderType};
    use rust_decimal_macros::dec;

    fn ledger() -> (ShadowLedger, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(0));
        (ShadowLedger::new(clock.clone()), clock)
    }

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            best_bid: dec!(49999),
            best_ask: dec!(50001),
            bid_depth: dec!(10),
            ask_depth: dec!(10),
            timestamp_ms: 0,
        }
    }

    fn intent(signal_id: &str, symbol: &str) -> PreparedIntent {
        PreparedIntent {
            signal_id: signal_id.to_string(),
            symbol: symbol.to_string(),
            direction: Direction::Long,
            entry_zone: vec![],
            stop_loss: dec!(49000),
            take_profits: vec![dec!(51000)],
            confidence: 80.0,
            leverage: 1.0,
            velocity: 0.0,
            position_size_usd: dec!(1000),
            order_type: OrderType::Limit,
            limit_price: Some(dec!(50000)),
            market_snapshot: snapshot(),
            prepared_at: 0,
            state: IntentState::Pending,
        }
    }

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
    fn process_then_confirm_produces_exactly_one_position() {
        let (ledger, _clock) = ledger();
        ledger.process_intent(intent("s1", "BTCUSDT"));
        assert!(ledger.get_intent("s1").is_some());

        ledger.confirm_execution(
            "BTCUSDT",
            Direction::Long,
            dec!(49000),
            vec![dec!(51000)],
            fill(dec!(50000), dec!(0.02)),
        );
        ledger.remove_intent("s1");

        assert!(ledger.get_intent("s1").is_none());
        assert_eq!(ledger.get_all_positions().len(), 1);
    }

    #[test]
    fn validate_intent_overwrites_the_pending_stub_and_marks_validated() {
        let (ledger, _clock) = ledger();
        let mut stub = intent("s1", "BTCUSDT");
        stub.position_size_usd = Decimal::ZERO;
        ledger.process_intent(stub);

        let full = intent("s1", "BTCUSDT");
        ledger.validate_intent(full);

        let stored = ledger.get_intent("s1").unwrap();
        assert_eq!(stored.state, IntentState::Validated);
        assert_eq!(stored.position_size_usd, dec!(1000));
    }

    #[test]
    fn at_most_one_position_per_symbol_after_repeated_confirms() {
        let (ledger, _clock) = ledger();
        ledger.confirm_execution(
            "BTCUSDT",
            Direction::Long,
            dec!(49000),
            vec![dec!(51000)],
            fill(dec!(50000), dec!(0.01)),
        );
        ledger.confirm_execution(
            "BTCUSDT",
            Direction::Long,
            dec!(49000),
            vec![dec!(51000)],
            fill(dec!(50500), dec!(0.01)),
        );
        let positions: Vec<_> = ledger.get_all_positions().into_iter().filter(|p| p.symbol == "BTCUSDT").collect();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size_units, dec!(0.02));
    }

    #[test]
    fn close_position_produces_one_trade_record_and_removes_position() {
        let (ledger, clock) = ledger();
        clock.advance(1_000);
        ledger.confirm_execution(
            "BTCUSDT",
            Direction::Long,
            dec!(49000),
            vec![dec!(51000)],
            fill(dec!(50000), dec!(1)),
        );
        let record = ledger.close_position("BTCUSDT", dec!(51000), ExitReason::TakeProfit, "mock".to_string());
        assert!(record.is_some());
        assert_eq!(ledger.get_position("BTCUSDT").map(|_| ()), None);
        assert_eq!(ledger.calc_pnl_stats_over(1).trade_count, 1);
    }

    #[test]
    fn reducing_fill_to_exactly_zero_auto_closes_and_returns_trade_record() {
        let (ledger, _clock) = ledger();
        let opened = ledger.confirm_execution(
            "BTCUSDT",
            Direction::Long,
            dec!(49000),
            vec![dec!(51000)],
            fill(dec!(50000), dec!(1)),
        );
        assert!(opened.is_none());
        assert_eq!(ledger.position_count(), 1);

        let closed = ledger.confirm_execution(
            "BTCUSDT",
            Direction::Long,
            dec!(49000),
            vec![dec!(51000)],
            fill(dec!(51000), dec!(-1)),
        );
        let record = closed.expect("flattening fill should produce a TradeRecord");
        assert_eq!(record.pnl_usd, dec!(1000));
        assert_eq!(ledger.position_count(), 0);
        assert_eq!(ledger.calc_pnl_stats_over(1).trade_count, 1);
    }

    #[test]
    fn stale_intent_sweeper_removes_expired_entries_only() {
        let (ledger, clock) = ledger();
        ledger.process_intent(intent("fresh", "ETHUSDT"));
        clock.advance(11_000);
        let mut fresh_at_new_time = intent("stale-origin", "BTCUSDT");
        fresh_at_new_time.prepared_at = clock.monotonic_ms();
        ledger.process_intent(fresh_at_new_time);
        let removed = ledger.sweep_stale_intents(10_000);
        assert!(removed.contains(&"fresh".to_string()));
        assert!(!removed.contains(&"stale-origin".to_string()));
    }

    #[test]
    fn close_all_positions_skips_symbols_with_no_price() {
        let (ledger, _clock) = ledger();
        ledger.confirm_execution(
            "BTCUSDT",
            Direction::Long,
            dec!(49000),
            vec![dec!(51000)],
            fill(dec!(50000), dec!(1)),
        );
        ledger.confirm_execution(
            "ETHUSDT",
            Direction::Long,
            dec!(2900),
            vec![dec!(3100)],
            fill(dec!(3000), dec!(1)),
        );
        let records = ledger.close_all_positions(ExitReason::Manual, "mock", |symbol| {
            if symbol == "BTCUSDT" {
                Some(dec!(50500))
            } else {
                None
            }
        });
        assert_eq!(records.len(), 1);
        assert_eq!(ledger.position_count(), 1);
    }
}
