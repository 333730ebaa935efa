// =============================================================================
// Safety Envelope (C6, §4.6)
// =============================================================================
//
// Gates evaluated in order on every CONFIRM, same ordering discipline as the
// predecessor's `TradeInsuranceGuard`/`RiskEngine::can_trade` (check cheapest
// and most authoritative gates first, short-circuit on the first block):
//   1. master arm switch
//   2. consecutive-loss circuit breaker
//   3. daily drawdown
//   4. weekly drawdown
// A position-size multiplier (1.0 normally, reduced under a "Cautious"-style
// near-breach condition) is exposed for the planner to apply on top of its
// own sizing.
// =============================================================================

pub mod circuit_breaker;
pub mod drawdown;
pub mod proposal;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::errors::BlockReason;
use std::sync::Arc;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use drawdown::{DrawdownGate, DrawdownStatus};
pub use proposal::{sign_proposal, verify_proposal, EmergencyAction, ProposalPayload, SignedProposal, VerifyOutcome};

struct Inner {
    armed: bool,
    breaker: CircuitBreaker,
    drawdown: DrawdownGate,
    reduce_only: bool,
    disabled_venues: Vec<String>,
    /// Set by the composition root's drift-monitor sampling loop when C7
    /// raises SAFETY_STOP/HARD_KILL (§2: "the drift monitor... can trigger
    /// the safety envelope"), cleared on the operator's drift-monitor reset.
    /// This is the channel through which `BlockReason::SafetyStopActive`/
    /// `HardKillActive` actually reach a PREPARE/CONFIRM reply — the drift
    /// monitor itself has no reference to this envelope (§9: no shared base
    /// class, direct composition only).
    external_block: Option<BlockReason>,
}

pub struct SafetyEnvelope {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl SafetyEnvelope {
    pub fn new(
        armed: bool,
        n_loss: u32,
        cooldown_ms: i64,
        daily_drawdown_pct: f64,
        weekly_drawdown_pct: f64,
        starting_equity: Decimal,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                armed,
                breaker: CircuitBreaker::new(n_loss, cooldown_ms),
                drawdown: DrawdownGate::new(daily_drawdown_pct, weekly_drawdown_pct, starting_equity, Utc::now()),
                reduce_only: false,
                disabled_venues: Vec::new(),
                external_block: None,
            }),
            clock,
        }
    }

    /// Gate evaluation in §4.6 order — master arm, circuit breaker, (drawdown
    /// is checked separately via `check_drawdown_gates` since it needs a
    /// current equity reading the caller must supply). Returns `Ok(())` when
    /// every gate here is clear, `Err(BlockReason)` on the first that blocks.
    pub fn check_gates(&self) -> Result<(), BlockReason> {
        let mut inner = self.inner.lock();

        if !inner.armed {
            return Err(BlockReason::ExecutionDisabledByOperator);
        }

        if let Some(reason) = inner.external_block {
            return Err(reason);
        }

        inner.breaker.tick(self.clock.monotonic_ms());
        if inner.breaker.is_blocking() {
            return Err(BlockReason::CircuitBreakerOpen);
        }

        Ok(())
    }

    /// Set or clear the drift monitor's escalation state (§4.7 state
    /// machine). `Some(SafetyStopActive)`/`Some(HardKillActive)` block every
    /// subsequent PREPARE/CONFIRM until the composition root observes the
    /// drift monitor return to NORMAL (manual `reset` only) and clears this
    /// with `None`.
    pub fn set_external_block(&self, reason: Option<BlockReason>) {
        self.inner.lock().external_block = reason;
    }

    pub fn external_block(&self) -> Option<BlockReason> {
        self.inner.lock().external_block
    }

    /// Venue-level kill switch (an enrichment beyond the core four gates) —
    /// checked by the gateway/planner before routing an order to a specific
    /// venue, since no venue has been chosen yet at PREPARE time.
    pub fn is_venue_disabled(&self, venue: &str) -> bool {
        self.inner.lock().disabled_venues.iter().any(|v| v == venue)
    }

    pub fn is_reduce_only(&self) -> bool {
        self.inner.lock().reduce_only
    }

    /// Feed the latest account equity into the drawdown gates. Called after
    /// every trade closes (or periodically from the drift sampler) so the
    /// daily/weekly windows stay current even on quiet days.
    pub fn observe_equity(&self, equity: Decimal) -> DrawdownStatus {
        let mut inner = self.inner.lock();
        inner.drawdown.observe(equity, Utc::now())
    }

    pub fn check_drawdown_gates(&self, equity: Decimal) -> Result<(), BlockReason> {
        let status = self.observe_equity(equity);
        if status.daily_exceeded {
            return Err(BlockReason::DailyDrawdownExceeded);
        }
        if status.weekly_exceeded {
            return Err(BlockReason::WeeklyDrawdownExceeded);
        }
        Ok(())
    }

    /// Record a completed trade's outcome against the circuit breaker.
    pub fn record_trade(&self, won: bool) {
        let mut inner = self.inner.lock();
        inner.breaker.record_trade(won, self.clock.monotonic_ms());
    }

    /// A multiplier the planner applies on top of its own position sizing.
    /// Reduced while the breaker is half-open (a single probe trade, not a
    /// full-size one) or while reduce-only mode is active.
    pub fn size_multiplier(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.reduce_only {
            return 0.0;
        }
        match inner.breaker.state() {
            BreakerState::HalfOpen => 0.25,
            BreakerState::Tripped => 0.0,
            BreakerState::Closed => 1.0,
        }
    }

    // -------------------------------------------------------------------
    // Operator commands — each of these is only ever called after a
    // `SignedProposal` has verified (§4.6.1); this module does not itself
    // check signatures.
    // -------------------------------------------------------------------

    pub fn arm(&self) {
        self.inner.lock().armed = true;
        info!("execution armed by operator command");
    }

    pub fn disarm(&self, reason: &str) {
        self.inner.lock().armed = false;
        warn!(reason, "execution disarmed by operator command");
    }

    pub fn reset_circuit_breaker(&self, reason: &str) {
        self.inner.lock().breaker.reset();
        info!(reason, "circuit breaker reset by operator command");
    }

    pub fn set_reduce_only(&self, enabled: bool) {
        self.inner.lock().reduce_only = enabled;
        warn!(enabled, "reduce-only mode changed by operator command");
    }

    pub fn disable_venue(&self, venue: &str) {
        let mut inner = self.inner.lock();
        if !inner.disabled_venues.iter().any(|v| v == venue) {
            inner.disabled_venues.push(venue.to_string());
        }
        warn!(venue, "venue disabled by operator command");
    }

    pub fn enable_venue(&self, venue: &str) {
        self.inner.lock().disabled_venues.retain(|v| v != venue);
        info!(venue, "venue re-enabled by operator command");
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock().armed
    }
}

/// Apply a verified `EmergencyAction` to the envelope. Does not itself touch
/// the gateway — `CancelAll`/`HaltTrading` callers are expected to also tell
/// the gateway to cancel open orders; this only flips the safety state.
pub fn apply_emergency_action(envelope: &SafetyEnvelope, action: &EmergencyAction) {
    match action {
        EmergencyAction::HaltTrading => envelope.disarm("EMERGENCY_ACTION: HALT_TRADING"),
        EmergencyAction::CancelAll => envelope.set_reduce_only(true),
        EmergencyAction::ReduceOnly => envelope.set_reduce_only(true),
        EmergencyAction::DisableVenue { venue } => envelope.disable_venue(venue),
    }
}

/// §4.6 operator command `flatten_all(reason)`: close every open Position
/// through the gateway one symbol at a time (the adapter contract's
/// `close_all_positions` doesn't return which symbol each fill belongs to,
/// so reconciliation goes through the per-symbol `close_position` path),
/// reconcile the Ledger with the resulting fill, then disarm so nothing
/// reopens a position before an operator reviews what happened. Also called
/// by the drift monitor's HARD_KILL path (§4.7) and by the `CancelAll`/
/// `DisableVenue` emergency actions where the caller wants an immediate,
/// synchronous flatten rather than just a state flip.
#[tracing::instrument(skip(envelope, gateway, ledger))]
pub async fn flatten_all(
    envelope: &SafetyEnvelope,
    gateway: &crate::gateway::VenueGateway,
    ledger: &crate::ledger::ShadowLedger,
    reason: &str,
) -> Vec<crate::ledger::TradeRecord> {
    let venue = gateway.active_venue_name().to_string();
    let symbols: Vec<String> = ledger.get_all_positions().into_iter().map(|p| p.symbol).collect();

    let mut records = Vec::new();
    for symbol in symbols {
        match gateway.close_position(&symbol).await {
            Ok(result) if result.success => {
                let exit_price = result.fill_price.unwrap_or_default();
                if let Some(record) =
                    ledger.close_position(&symbol, exit_price, crate::types::ExitReason::SafetyStop, venue.clone())
                {
                    records.push(record);
                }
            }
            Ok(result) => {
                warn!(symbol, error = ?result.error, "flatten_all: close_position did not succeed");
            }
            Err(e) => {
                warn!(symbol, error = %e, "flatten_all: close_position failed");
            }
        }
    }

    envelope.disarm(reason);
    records
}
