// =============================================================================
// Consecutive-loss circuit breaker (§4.6)
// =============================================================================
//
// TRIPPED after `n_loss` consecutive losing trades; stays tripped for a fixed
// cooldown, then moves to HALF_OPEN — the next trade's outcome decides
// whether it returns to CLOSED or trips straight back to TRIPPED. Modelled
// the same way the predecessor's risk engine tracks `consecutive_losses`,
// but promoted to an explicit three-state machine per §9's "small state
// machine" design note.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Tripped,
    HalfOpen,
}

pub struct CircuitBreaker {
    n_loss: u32,
    cooldown_ms: i64,
    consecutive_losses: u32,
    state: BreakerState,
    tripped_at_ms: Option<i64>,
}

impl CircuitBreaker {
    pub fn new(n_loss: u32, cooldown_ms: i64) -> Self {
        Self {
            n_loss,
            cooldown_ms,
            consecutive_losses: 0,
            state: BreakerState::Closed,
            tripped_at_ms: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Record a completed trade's outcome and advance the state machine.
    pub fn record_trade(&mut self, won: bool, now_ms: i64) {
        match self.state {
            BreakerState::HalfOpen => {
                if won {
                    info!("circuit breaker half-open trade won — closing breaker");
                    self.state = BreakerState::Closed;
                    self.consecutive_losses = 0;
                    self.tripped_at_ms = None;
                } else {
                    warn!("circuit breaker half-open trade lost — tripping again");
                    self.trip(now_ms);
                }
                return;
            }
            BreakerState::Tripped => {
                // A trade shouldn't be recorded while tripped, but guard anyway.
                return;
            }
            BreakerState::Closed => {}
        }

        if won {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
            if self.consecutive_losses >= self.n_loss {
                self.trip(now_ms);
            }
        }
    }

    fn trip(&mut self, now_ms: i64) {
        self.state = BreakerState::Tripped;
        self.tripped_at_ms = Some(now_ms);
        warn!(consecutive_losses = self.consecutive_losses, "circuit breaker tripped");
    }

    /// Advance TRIPPED -> HALF_OPEN once the cooldown has elapsed. Must be
    /// polled (or called before every trade-gate check) since the breaker has
    /// no timer of its own.
    pub fn tick(&mut self, now_ms: i64) {
        if self.state == BreakerState::Tripped {
            if let Some(tripped_at) = self.tripped_at_ms {
                if now_ms - tripped_at >= self.cooldown_ms {
                    info!("circuit breaker cooldown elapsed — moving to half-open");
                    self.state = BreakerState::HalfOpen;
                }
            }
        }
    }

    /// Operator override: force back to CLOSED regardless of cooldown.
    pub fn reset(&mut self) {
        self.state = BreakerState::Closed;
        self.consecutive_losses = 0;
        self.tripped_at_ms = None;
        info!("circuit breaker manually reset by operator");
    }

    pub fn is_blocking(&self) -> bool {
        self.state == BreakerState::Tripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_n_consecutive_losses() {
        let mut breaker = CircuitBreaker::new(3, 1_000);
        breaker.record_trade(false, 0);
        breaker.record_trade(false, 0);
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_trade(false, 0);
        assert_eq!(breaker.state(), BreakerState::Tripped);
        assert!(breaker.is_blocking());
    }

    #[test]
    fn moves_to_half_open_after_cooldown_then_closes_on_a_win() {
        let mut breaker = CircuitBreaker::new(1, 1_000);
        breaker.record_trade(false, 0);
        assert_eq!(breaker.state(), BreakerState::Tripped);

        breaker.tick(500);
        assert_eq!(breaker.state(), BreakerState::Tripped);

        breaker.tick(1_001);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_trade(true, 1_100);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_loss_trips_straight_back() {
        let mut breaker = CircuitBreaker::new(1, 1_000);
        breaker.record_trade(false, 0);
        breaker.tick(1_001);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_trade(false, 1_100);
        assert_eq!(breaker.state(), BreakerState::Tripped);
    }

    #[test]
    fn manual_reset_clears_tripped_state() {
        let mut breaker = CircuitBreaker::new(1, 1_000);
        breaker.record_trade(false, 0);
        assert!(breaker.is_blocking());
        breaker.reset();
        assert!(!breaker.is_blocking());
    }
}
