// =============================================================================
// Handler / Planner (C2, §4.2)
// =============================================================================
//
// §9: "no shared base class — the planner holds direct references to the
// ledger, replay guard, safety envelope and gateway rather than routing
// through an intermediate abstraction." This module is that planner.
// =============================================================================

pub mod order_type;
pub mod sizing;
pub mod sweeper;

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::PlannerParams;
use crate::errors::{BlockReason, RejectReason};
use crate::gateway::{OrderKind, OrderRequest, VenueGateway};
use crate::ledger::partial_fill::{ChaseDecision, PartialFillTracker};
use crate::ledger::{Fill, IntentState, PreparedIntent, ShadowLedger, TradeRecord};
use crate::market_data::L2SnapshotProvider;
use crate::replay_guard::{RegisterOutcome, ReplayGuard, SignalFingerprint};
use crate::safety::SafetyEnvelope;
use crate::types::{OrderType, Signal, SignalKind};

pub use order_type::{analyze_fees, decide_order_type, FeeAnalysis, VelocityReason};
pub use sizing::kelly_size_usd;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PlannerResponse {
    Prepared {
        position_size: Decimal,
        order_type: OrderType,
        has_l2_data: bool,
        fee_analysis: Option<FeeAnalysis>,
    },
    Executed {
        fill_price: Decimal,
        fill_size: Decimal,
        broker_order_id: Option<String>,
    },
    Blocked {
        reason: BlockReason,
    },
    Rejected {
        reason: RejectReason,
    },
    Aborted,
    Duplicate,
}

pub struct Planner {
    ledger: Arc<ShadowLedger>,
    replay_guard: Arc<ReplayGuard>,
    safety: Arc<SafetyEnvelope>,
    gateway: Arc<VenueGateway>,
    market_data: Arc<L2SnapshotProvider>,
    clock: Arc<dyn Clock>,
    params: PlannerParams,
    /// Read on every PREPARE for Kelly sizing, written by the composition
    /// root's equity-sampling loop. `Planner` is shared as `Arc<Planner>`
    /// across every transport connection, so this can't be a plain field
    /// mutated through `&mut self`.
    equity: parking_lot::RwLock<Decimal>,
    /// Narrow event channel for closed trades (§9 "event-emitter patterns...
    /// re-express as narrowly-typed message channels"). The Planner doesn't
    /// depend on the Drift Monitor (§2 dependency order has C2 depend on
    /// C3/C4/C5/C6, not C7), so it can't call it directly; the composition
    /// root drains this channel and forwards each record to both the safety
    /// envelope's circuit breaker and the drift monitor's z-score ring.
    trade_events: tokio::sync::mpsc::UnboundedSender<TradeRecord>,
}

impl Planner {
    pub fn new(
        ledger: Arc<ShadowLedger>,
        replay_guard: Arc<ReplayGuard>,
        safety: Arc<SafetyEnvelope>,
        gateway: Arc<VenueGateway>,
        market_data: Arc<L2SnapshotProvider>,
        clock: Arc<dyn Clock>,
        params: PlannerParams,
        equity: Decimal,
        trade_events: tokio::sync::mpsc::UnboundedSender<TradeRecord>,
    ) -> Self {
        Self {
            ledger,
            replay_guard,
            safety,
            gateway,
            market_data,
            clock,
            params,
            equity: parking_lot::RwLock::new(equity),
            trade_events,
        }
    }

    pub fn set_equity(&self, equity: Decimal) {
        *self.equity.write() = equity;
    }

    pub fn equity(&self) -> Decimal {
        *self.equity.read()
    }

    /// PREPARE contract (§4.2).
    pub fn prepare(&self, signal: Signal) -> PlannerResponse {
        debug_assert_eq!(signal.kind, SignalKind::Prepare);

        let fingerprint = SignalFingerprint::new(&signal.signal_id, signal.kind);
        if self.replay_guard.register(fingerprint) == RegisterOutcome::Duplicate {
            return PlannerResponse::Duplicate;
        }

        // Step 1: register PENDING.
        self.ledger
            .process_intent(PreparedIntent::pending_stub(&signal, self.clock.monotonic_ms()));

        // Step 2: consult the safety envelope — master arm, circuit breaker,
        // drift-monitor escalation (§4.6 gates 1-2), then daily/weekly
        // drawdown (§4.6 gates 3-4).
        if let Err(reason) = self.safety.check_gates() {
            self.ledger.reject_intent(&signal.signal_id, &reason.to_string());
            return PlannerResponse::Blocked { reason };
        }
        let equity = self.equity();
        if let Err(reason) = self.safety.check_drawdown_gates(equity) {
            self.ledger.reject_intent(&signal.signal_id, &reason.to_string());
            return PlannerResponse::Blocked { reason };
        }

        // Step 3: fetch the current L2 snapshot.
        let Some(snapshot) = self.market_data.get(&signal.symbol) else {
            self.ledger
                .reject_intent(&signal.signal_id, &RejectReason::NoL2Data.to_string());
            return PlannerResponse::Rejected { reason: RejectReason::NoL2Data };
        };

        let direction = signal.direction.unwrap_or(crate::types::Direction::Long);

        // Step 4: Kelly-fraction position sizing, adjusted by the safety
        // envelope's size multiplier.
        let mut position_size = kelly_size_usd(
            equity,
            self.params.risk_pct,
            signal.confidence,
            signal.leverage,
            self.params.max_position_size_pct,
        );
        // A tripped breaker is already caught by `check_gates()` above, so the
        // only state that reaches here with a non-positive multiplier is an
        // operator-set reduce-only mode (§4.6 "size_multiplier... a
        // multiplier of 0 is equivalent to blocked").
        let multiplier = self.safety.size_multiplier();
        if multiplier <= 0.0 {
            self.ledger
                .reject_intent(&signal.signal_id, &BlockReason::ExecutionDisabledByOperator.to_string());
            return PlannerResponse::Blocked { reason: BlockReason::ExecutionDisabledByOperator };
        }
        if multiplier < 1.0 {
            position_size = position_size * Decimal::try_from(multiplier).unwrap_or(Decimal::ONE);
        }

        // Step 5: velocity-keyed order-type decision.
        let decision = decide_order_type(
            signal.velocity,
            direction,
            &snapshot,
            self.params.extreme_velocity_threshold,
            self.params.moderate_velocity_threshold,
        );

        // §4.2.1: advisory fee analysis for LIMIT/POST_ONLY, never blocking.
        let fee_analysis = if decision.order_type != OrderType::Market {
            signal.take_profits.first().map(|tp| {
                analyze_fees(
                    decision.limit_price.unwrap_or(snapshot.best_bid),
                    *tp,
                    0.0002,
                    0.0004,
                )
            })
        } else {
            None
        };

        // Step 6: store the PreparedIntent.
        let intent = PreparedIntent::from_signal(
            &signal,
            position_size,
            decision.order_type,
            decision.limit_price,
            snapshot,
            self.clock.monotonic_ms(),
        );
        self.ledger.validate_intent(intent);

        // Step 7: telemetry.
        info!(
            signal_id = %signal.signal_id,
            symbol = %signal.symbol,
            position_size = %position_size,
            order_type = %decision.order_type,
            "trap_prepared"
        );

        PlannerResponse::Prepared {
            position_size,
            order_type: decision.order_type,
            has_l2_data: true,
            fee_analysis,
        }
    }

    /// CONFIRM contract (§4.2).
    pub async fn confirm(&self, signal_id: &str) -> PlannerResponse {
        let fingerprint = SignalFingerprint::new(signal_id, SignalKind::Confirm);
        if self.replay_guard.register(fingerprint) == RegisterOutcome::Duplicate {
            return PlannerResponse::Duplicate;
        }

        let Some(intent) = self.ledger.get_intent(signal_id) else {
            return PlannerResponse::Rejected { reason: RejectReason::PrepareNotFound };
        };

        if intent.is_expired(self.clock.monotonic_ms(), self.params.prepare_ttl_ms) {
            self.ledger.remove_intent(signal_id);
            return PlannerResponse::Rejected { reason: RejectReason::StaleSignal };
        }

        if intent.state != IntentState::Validated {
            return PlannerResponse::Rejected { reason: RejectReason::PrepareNotFound };
        }

        if let Err(reason) = self.safety.check_gates() {
            return PlannerResponse::Blocked { reason };
        }

        let Some(fresh_snapshot) = self.market_data.get(&intent.symbol) else {
            return PlannerResponse::Rejected { reason: RejectReason::NoL2Data };
        };
        if fresh_snapshot.bid_depth.is_zero() || fresh_snapshot.ask_depth.is_zero() {
            return PlannerResponse::Rejected { reason: RejectReason::InsufficientLiquidity };
        }

        if self.safety.is_venue_disabled(self.gateway.active_venue_name()) {
            return PlannerResponse::Blocked { reason: BlockReason::ExecutionDisabledByOperator };
        }

        let order_kind = match intent.order_type {
            OrderType::Market => OrderKind::Market,
            OrderType::Limit => OrderKind::Limit,
            OrderType::PostOnly => OrderKind::PostOnly,
        };

        let request = OrderRequest {
            symbol: intent.symbol.clone(),
            side: intent.direction,
            size_units: intent.position_size_usd,
            order_type: order_kind,
            limit_price: intent.limit_price,
            reduce_only: false,
            post_only: matches!(intent.order_type, OrderType::PostOnly),
            client_order_id: format!("{}-{}", intent.signal_id, Uuid::new_v4()),
        };

        let result = match self.gateway.send_order(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(signal_id, error = %e, "order send failed during CONFIRM");
                return PlannerResponse::Rejected { reason: RejectReason::InsufficientLiquidity };
            }
        };

        if !result.success {
            return PlannerResponse::Rejected { reason: RejectReason::InsufficientLiquidity };
        }

        let fill_price = result.fill_price.unwrap_or(intent.limit_price.unwrap_or(fresh_snapshot.best_ask));
        let fill_size = result.fill_size.unwrap_or(intent.position_size_usd);

        let closed = self.ledger.confirm_execution(
            &intent.symbol,
            intent.direction,
            intent.stop_loss,
            intent.take_profits.clone(),
            Fill {
                fill_id: Uuid::new_v4().to_string(),
                price: fill_price,
                qty: fill_size,
                fee: Decimal::ZERO,
                venue: self.gateway.active_venue_name().to_string(),
                broker_order_id: result.broker_order_id.clone().unwrap_or_default(),
                timestamp_ms: self.clock.now_ms(),
            },
        );
        if let Some(record) = closed {
            let _ = self.trade_events.send(record);
        }

        // §4.3/§8 scenario 6: drive the chase-vs-cancel state machine off
        // the fill the venue actually reported, not the requested size.
        let mut tracker = PartialFillTracker::new(intent.position_size_usd);
        let decision = tracker.record_fill(fill_size, self.clock.monotonic_ms());
        let mut total_fill_size = fill_size;
        let mut total_fill_price = fill_price;

        if tracker.remaining() > Decimal::ZERO {
            match decision {
                ChaseDecision::Chase => {
                    if let Some(chase_snapshot) = self.market_data.get(&intent.symbol) {
                        let remainder = tracker.remaining();
                        let chase_price = chase_snapshot.aggressive_price(intent.direction);
                        let chase_request = OrderRequest {
                            symbol: intent.symbol.clone(),
                            side: intent.direction,
                            size_units: remainder,
                            order_type: OrderKind::Limit,
                            limit_price: Some(chase_price),
                            reduce_only: false,
                            post_only: false,
                            client_order_id: format!("{}-chase-{}", intent.signal_id, Uuid::new_v4()),
                        };
                        match self.gateway.send_order(chase_request).await {
                            Ok(chase_result) if chase_result.success => {
                                let chase_fill_price = chase_result.fill_price.unwrap_or(chase_price);
                                let chase_fill_size = chase_result.fill_size.unwrap_or(remainder);
                                tracker.record_fill(chase_fill_size, self.clock.monotonic_ms());
                                let chase_closed = self.ledger.confirm_execution(
                                    &intent.symbol,
                                    intent.direction,
                                    intent.stop_loss,
                                    intent.take_profits.clone(),
                                    Fill {
                                        fill_id: Uuid::new_v4().to_string(),
                                        price: chase_fill_price,
                                        qty: chase_fill_size,
                                        fee: Decimal::ZERO,
                                        venue: self.gateway.active_venue_name().to_string(),
                                        broker_order_id: chase_result.broker_order_id.unwrap_or_default(),
                                        timestamp_ms: self.clock.now_ms(),
                                    },
                                );
                                if let Some(record) = chase_closed {
                                    let _ = self.trade_events.send(record);
                                }
                                let combined = total_fill_size + chase_fill_size;
                                total_fill_price =
                                    (total_fill_price * total_fill_size + chase_fill_price * chase_fill_size) / combined;
                                total_fill_size = combined;
                                info!(
                                    signal_id,
                                    symbol = %intent.symbol,
                                    chase_fill_size = %chase_fill_size,
                                    "partial fill chased remainder at current touch"
                                );
                            }
                            _ => warn!(
                                signal_id,
                                symbol = %intent.symbol,
                                "chase order for partial-fill remainder failed, position stays partially filled"
                            ),
                        }
                    }
                }
                ChaseDecision::Wait => {
                    // Below-half fill ratio on first observation: elapsed is
                    // always zero here, so §4.3's 5s cancel threshold can't
                    // have passed yet. Re-check once it has, and cancel the
                    // remainder if the venue never caught the fill up.
                    if let Some(broker_order_id) = result.broker_order_id.clone() {
                        let gateway = self.gateway.clone();
                        let owned_signal_id = intent.signal_id.clone();
                        let symbol = intent.symbol.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(std::time::Duration::from_millis(5_000)).await;
                            warn!(
                                signal_id = %owned_signal_id,
                                symbol = %symbol,
                                broker_order_id,
                                "partial fill stayed below half fill ratio past 5s, cancelling remainder"
                            );
                            let _ = gateway.cancel_order(&broker_order_id).await;
                        });
                    }
                }
                ChaseDecision::Cancel => {
                    // Unreachable on the first observation of a fresh
                    // tracker (elapsed from first fill is always zero), kept
                    // for exhaustiveness against the state machine's public
                    // decision type.
                }
            }
        }

        self.ledger.remove_intent(signal_id);

        info!(signal_id, symbol = %intent.symbol, fill_price = %total_fill_price, "trap_sprung");

        PlannerResponse::Executed {
            fill_price: total_fill_price,
            fill_size: total_fill_size,
            broker_order_id: result.broker_order_id,
        }
    }

    /// ABORT contract (§4.2).
    pub fn abort(&self, signal_id: &str) -> PlannerResponse {
        self.ledger.remove_intent(signal_id);
        self.ledger.reject_intent(signal_id, "Signal aborted");
        info!(signal_id, "trap_aborted");
        PlannerResponse::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::PlannerParams;
    use crate::gateway::mock::MockAdapter;
    use crate::ledger::ShadowLedger;
    use crate::replay_guard::ReplayGuard;
    use crate::types::{Direction, MarketSnapshot, SignalKind};
    use rust_decimal_macros::dec;

    fn harness(
        starting_equity: Decimal,
    ) -> (Planner, Arc<FakeClock>, Arc<ShadowLedger>, tokio::sync::mpsc::UnboundedReceiver<TradeRecord>) {
        let mock = Arc::new(MockAdapter::new(starting_equity));
        harness_with_adapter(starting_equity, mock as Arc<dyn crate::gateway::VenueAdapter>)
    }

    fn harness_with_adapter(
        starting_equity: Decimal,
        adapter: Arc<dyn crate::gateway::VenueAdapter>,
    ) -> (Planner, Arc<FakeClock>, Arc<ShadowLedger>, tokio::sync::mpsc::UnboundedReceiver<TradeRecord>) {
        let clock: Arc<FakeClock> = Arc::new(FakeClock::new(0));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let ledger = Arc::new(ShadowLedger::new(dyn_clock.clone()));
        let replay_guard = Arc::new(ReplayGuard::new(60_000, 10_000, dyn_clock.clone()));
        let safety = Arc::new(SafetyEnvelope::new(
            true,
            3,
            4 * 60 * 60 * 1000,
            0.05,
            0.10,
            starting_equity,
            dyn_clock.clone(),
        ));
        let gateway = Arc::new(VenueGateway::new(
            vec![("mock".to_string(), adapter)],
            std::env::temp_dir().join(format!("planner-test-orders-{}.log", Uuid::new_v4())),
            3,
        ));
        let market_data = Arc::new(L2SnapshotProvider::new());
        market_data.update(
            "BTCUSDT",
            MarketSnapshot {
                best_bid: dec!(49999),
                best_ask: dec!(50001),
                bid_depth: dec!(10),
                ask_depth: dec!(10),
                timestamp_ms: 0,
            },
        );

        let (trade_tx, trade_rx) = tokio::sync::mpsc::unbounded_channel();
        let planner = Planner::new(
            ledger.clone(),
            replay_guard,
            safety,
            gateway,
            market_data,
            dyn_clock,
            PlannerParams::default(),
            starting_equity,
            trade_tx,
        );
        (planner, clock, ledger, trade_rx)
    }

    fn prepare_signal(signal_id: &str) -> Signal {
        Signal {
            signal_id: signal_id.to_string(),
            kind: SignalKind::Prepare,
            symbol: "BTCUSDT".to_string(),
            direction: Some(Direction::Long),
            entry_zone: vec![dec!(50000), dec!(49950)],
            stop_loss: Some(dec!(49500)),
            take_profits: vec![dec!(50500)],
            confidence: 80.0,
            leverage: 20.0,
            velocity: 0.002,
            trap_type: None,
            timestamp: 0,
        }
    }

    /// Spec §8 scenario 1 (happy path): PREPARE sizes ~20 USD and picks
    /// LIMIT (velocity 0.2%/s sits in the medium band), CONFIRM fills and
    /// leaves the ledger with exactly one LONG BTCUSDT position.
    #[tokio::test]
    async fn happy_path_prepare_then_confirm_opens_one_position() {
        let (planner, _clock, ledger, _trade_rx) = harness(dec!(100000));

        match planner.prepare(prepare_signal("sig-1")) {
            PlannerResponse::Prepared { position_size, order_type, .. } => {
                assert!((position_size - dec!(20)).abs() < dec!(0.01));
                assert_eq!(order_type, OrderType::Limit);
            }
            other => panic!("expected Prepared, got {other:?}"),
        }

        match planner.confirm("sig-1").await {
            PlannerResponse::Executed { fill_price, .. } => {
                assert!((fill_price - dec!(50001)).abs() < dec!(1));
            }
            other => panic!("expected Executed, got {other:?}"),
        }

        let positions = ledger.get_all_positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "BTCUSDT");
        assert_eq!(positions[0].side, Direction::Long);
        assert!(ledger.get_intent("sig-1").is_none());
    }

    /// Spec §8 scenario 2: CONFIRM arriving after PREPARE_TTL (10s) is
    /// rejected STALE_SIGNAL and leaves no position or intent behind.
    #[tokio::test]
    async fn stale_confirm_is_rejected_and_intent_is_dropped() {
        let (planner, clock, ledger, _trade_rx) = harness(dec!(100000));

        planner.prepare(prepare_signal("sig-2"));
        clock.advance(11_000);

        match planner.confirm("sig-2").await {
            PlannerResponse::Rejected { reason } => {
                assert_eq!(reason, RejectReason::StaleSignal);
            }
            other => panic!("expected Rejected(StaleSignal), got {other:?}"),
        }

        assert!(ledger.get_intent("sig-2").is_none());
        assert!(ledger.get_all_positions().is_empty());
    }

    /// Spec §8 scenario 3 / idempotency property: a duplicate PREPARE for
    /// the same signal_id is answered with the replay guard's canonical
    /// duplicate reply and does not create a second PreparedIntent.
    #[tokio::test]
    async fn duplicate_prepare_is_idempotent() {
        let (planner, _clock, ledger, _trade_rx) = harness(dec!(100000));

        let first = planner.prepare(prepare_signal("sig-3"));
        assert!(matches!(first, PlannerResponse::Prepared { .. }));

        let second = planner.prepare(prepare_signal("sig-3"));
        assert!(matches!(second, PlannerResponse::Duplicate));

        assert!(ledger.get_intent("sig-3").is_some());
    }

    /// CONFIRM with no prior PREPARE is rejected PREPARE_NOT_FOUND (§8
    /// PREPARE→CONFIRM ordering property).
    #[tokio::test]
    async fn confirm_without_prepare_is_rejected() {
        let (planner, _clock, _ledger, _trade_rx) = harness(dec!(100000));

        match planner.confirm("never-prepared").await {
            PlannerResponse::Rejected { reason } => assert_eq!(reason, RejectReason::PrepareNotFound),
            other => panic!("expected Rejected(PrepareNotFound), got {other:?}"),
        }
    }

    /// ABORT always replies Aborted and removes any in-flight intent so a
    /// later CONFIRM for the same signal_id is PREPARE_NOT_FOUND.
    #[tokio::test]
    async fn abort_removes_the_intent() {
        let (planner, _clock, ledger, _trade_rx) = harness(dec!(100000));

        planner.prepare(prepare_signal("sig-4"));
        assert!(matches!(planner.abort("sig-4"), PlannerResponse::Aborted));
        assert!(ledger.get_intent("sig-4").is_none());

        match planner.confirm("sig-4").await {
            PlannerResponse::Rejected { reason } => assert_eq!(reason, RejectReason::PrepareNotFound),
            other => panic!("expected Rejected(PrepareNotFound), got {other:?}"),
        }
    }

    /// A venue adapter that fills 60% of the requested size on the first
    /// order and the remainder on any subsequent order — stands in for a
    /// real venue reporting a partial fill, so CONFIRM's chase integration
    /// (§4.3, §8 scenario 6) can be exercised end to end.
    struct PartialFillAdapter {
        calls: parking_lot::Mutex<u32>,
    }

    impl PartialFillAdapter {
        fn new() -> Self {
            Self { calls: parking_lot::Mutex::new(0) }
        }
    }

    #[async_trait::async_trait]
    impl crate::gateway::VenueAdapter for PartialFillAdapter {
        fn name(&self) -> &str {
            "partial-fill-test"
        }

        async fn send_order(
            &self,
            request: crate::gateway::OrderRequest,
        ) -> anyhow::Result<crate::gateway::OrderResult> {
            let mut calls = self.calls.lock();
            *calls += 1;
            let fill_size = if *calls == 1 { request.size_units * dec!(0.6) } else { request.size_units };
            Ok(crate::gateway::OrderResult {
                success: true,
                broker_order_id: Some(format!("partial-{calls}")),
                fill_price: Some(request.limit_price.unwrap_or(dec!(50001))),
                fill_size: Some(fill_size),
                status: "FILLED".to_string(),
                error: None,
            })
        }

        async fn get_account(&self) -> anyhow::Result<crate::gateway::AccountInfo> {
            Ok(crate::gateway::AccountInfo {
                equity: dec!(100000),
                available_balance: dec!(100000),
                unrealized_pnl: Decimal::ZERO,
            })
        }

        async fn get_positions(&self) -> anyhow::Result<Vec<crate::gateway::VenuePosition>> {
            Ok(vec![])
        }

        async fn close_position(&self, _symbol: &str) -> anyhow::Result<crate::gateway::OrderResult> {
            unimplemented!("not exercised by the partial-fill chase test")
        }

        async fn close_all_positions(&self) -> anyhow::Result<Vec<crate::gateway::OrderResult>> {
            Ok(vec![])
        }

        async fn cancel_order(&self, _order_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> anyhow::Result<crate::gateway::HealthStatus> {
            Ok(crate::gateway::HealthStatus { success: true, error: None })
        }
    }

    /// §8 scenario 6: a 0.6 fill ratio on the first order is above the 0.5
    /// chase threshold, so CONFIRM immediately sends a follow-up order for
    /// the remaining 0.4 and reports the combined fill.
    #[tokio::test]
    async fn confirm_chases_a_partial_fill_above_half_ratio() {
        let adapter = Arc::new(PartialFillAdapter::new());
        let (planner, _clock, ledger, _trade_rx) = harness_with_adapter(dec!(100000), adapter);

        planner.prepare(prepare_signal("sig-5"));
        match planner.confirm("sig-5").await {
            PlannerResponse::Executed { fill_size, .. } => {
                assert!((fill_size - dec!(20)).abs() < dec!(0.001));
            }
            other => panic!("expected Executed, got {other:?}"),
        }

        let positions = ledger.get_all_positions();
        assert_eq!(positions.len(), 1);
        assert!((positions[0].size_units - dec!(20)).abs() < dec!(0.001));
    }
}
