// =============================================================================
// Composition root — Central Application State
// =============================================================================
//
// Ties together C1-C7 behind `Arc` handles shared across the transport's
// per-connection tasks, the background loops spawned in `main`, and the
// admin REST API. Holds no business logic of its own — every method here
// is a thin accessor or a narrow bridge between components that §9
// deliberately keeps un-coupled from each other (the drift monitor cannot
// reach the safety envelope directly; this is where that wiring happens).
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::drift::DriftMonitor;
use crate::gateway::VenueGateway;
use crate::ledger::ShadowLedger;
use crate::market_data::L2SnapshotProvider;
use crate::planner::Planner;
use crate::replay_guard::ReplayGuard;
use crate::safety::SafetyEnvelope;
use crate::transport::TransportMetrics;

/// Shared across every admin API handler and background task via `Arc<AppState>`.
pub struct AppState {
    pub config: RwLock<RuntimeConfig>,
    pub config_path: PathBuf,

    pub clock: Arc<dyn Clock>,
    pub ledger: Arc<ShadowLedger>,
    pub replay_guard: Arc<ReplayGuard>,
    pub safety: Arc<SafetyEnvelope>,
    pub gateway: Arc<VenueGateway>,
    pub market_data: Arc<L2SnapshotProvider>,
    pub planner: Arc<Planner>,
    pub drift: Arc<DriftMonitor>,
    pub transport_metrics: Arc<TransportMetrics>,

    /// The operator's public key for verifying signed proposals (§4.6.1).
    /// `None` means the deployment has no proposal authority configured, in
    /// which case every `POST /api/v1/proposals` is rejected — there is no
    /// "trust whatever key the client sends" fallback.
    pub proposal_verifying_key: Option<VerifyingKey>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RuntimeConfig,
        config_path: PathBuf,
        clock: Arc<dyn Clock>,
        ledger: Arc<ShadowLedger>,
        replay_guard: Arc<ReplayGuard>,
        safety: Arc<SafetyEnvelope>,
        gateway: Arc<VenueGateway>,
        market_data: Arc<L2SnapshotProvider>,
        planner: Arc<Planner>,
        drift: Arc<DriftMonitor>,
        transport_metrics: Arc<TransportMetrics>,
        proposal_verifying_key: Option<VerifyingKey>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            config_path,
            clock,
            ledger,
            replay_guard,
            safety,
            gateway,
            market_data,
            planner,
            drift,
            transport_metrics,
            proposal_verifying_key,
        }
    }

    /// Persist the current config atomically (tmp + rename). Called after a
    /// PARAM_UPDATE proposal applies and on graceful shutdown.
    pub fn save_config(&self) -> anyhow::Result<()> {
        self.config.read().save(&self.config_path)
    }
}
