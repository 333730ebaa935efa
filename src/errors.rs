// =============================================================================
// Error-kind taxonomy (§7) — stable, wire-visible reason strings
// =============================================================================
//
// The taxonomy's contract is the stability of the reason string a caller sees
// on the wire, not Rust-level type dispatch, so these are `Copy` enums with a
// `Display`/serde string representation rather than a `std::error::Error`
// hierarchy. Fallible internal operations still return `anyhow::Result` and
// propagate with `.context(...)`; a `RejectReason`/`BlockReason` is attached
// at the boundary where a reply is constructed.
// =============================================================================

use serde::{Deserialize, Serialize};

/// The six error kinds of §7. Not every kind has a direct enum counterpart —
/// `AuthFailure`/`ProtocolError` are transport-level (see `transport::auth`),
/// `Transient` is handled and retried entirely inside the gateway, and
/// `Fatal` is raised through `FatalError` below rather than returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthFailure,
    ProtocolError,
    Rejected,
    Blocked,
    Transient,
    Fatal,
}

/// Stable reason strings for `{status:"rejected", reason}` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    NoL2Data,
    PrepareNotFound,
    StaleSignal,
    InsufficientLiquidity,
    Duplicate,
    SignalAborted,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoL2Data => "NO_L2_DATA",
            Self::PrepareNotFound => "PREPARE_NOT_FOUND",
            Self::StaleSignal => "STALE_SIGNAL",
            Self::InsufficientLiquidity => "INSUFFICIENT_LIQUIDITY",
            Self::Duplicate => "DUPLICATE",
            Self::SignalAborted => "Signal aborted",
        };
        write!(f, "{}", s)
    }
}

/// Stable reason strings for `{status:"blocked", reason}` replies — every one
/// of these requires operator action to clear (§7 `Blocked` kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    ExecutionDisabledByOperator,
    CircuitBreakerOpen,
    DailyDrawdownExceeded,
    WeeklyDrawdownExceeded,
    SafetyStopActive,
    HardKillActive,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ExecutionDisabledByOperator => "EXECUTION_DISABLED_BY_OPERATOR",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::DailyDrawdownExceeded => "DAILY_DRAWDOWN_EXCEEDED",
            Self::WeeklyDrawdownExceeded => "WEEKLY_DRAWDOWN_EXCEEDED",
            Self::SafetyStopActive => "SAFETY_STOP_ACTIVE",
            Self::HardKillActive => "HARD_KILL_ACTIVE",
        };
        write!(f, "{}", s)
    }
}

/// Transport-level reject reasons (§4.1); distinct from `RejectReason` because
/// they never reach the planner — the transport replies before C2 is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportRejectReason {
    InvalidSignature,
    IpcError,
    MaxConnectionsReached,
}

impl std::fmt::Display for TransportRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::IpcError => "IPC_ERROR",
            Self::MaxConnectionsReached => "MAX_CONNECTIONS_REACHED",
        };
        write!(f, "{}", s)
    }
}

/// A Fatal condition (§7): an invariant violation severe enough to demand
/// `flatten_all` and process termination. Raised through a dedicated channel
/// to the composition root rather than returned as a `Result`, since by
/// definition the component that detects it can no longer trust its own state.
#[derive(Debug, Clone)]
pub struct FatalError {
    pub component: &'static str,
    pub detail: String,
}

impl std::fmt::Display for FatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fatal invariant violation in {}: {}", self.component, self.detail)
    }
}

impl std::error::Error for FatalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reason_strings_are_stable() {
        assert_eq!(RejectReason::StaleSignal.to_string(), "STALE_SIGNAL");
        assert_eq!(RejectReason::PrepareNotFound.to_string(), "PREPARE_NOT_FOUND");
        assert_eq!(RejectReason::SignalAborted.to_string(), "Signal aborted");
    }

    #[test]
    fn block_reason_strings_are_stable() {
        assert_eq!(
            BlockReason::CircuitBreakerOpen.to_string(),
            "CIRCUIT_BREAKER_OPEN"
        );
        assert_eq!(
            BlockReason::ExecutionDisabledByOperator.to_string(),
            "EXECUTION_DISABLED_BY_OPERATOR"
        );
    }

    #[test]
    fn transport_reject_reason_strings_are_stable() {
        assert_eq!(
            TransportRejectReason::MaxConnectionsReached.to_string(),
            "MAX_CONNECTIONS_REACHED"
        );
    }
}
