// =============================================================================
// execution-core — Entry Point
// =============================================================================
//
// Boots C1-C7 in the dependency order fixed by §2 (leaves first: replay
// guard, ledger, gateway, safety envelope, drift monitor, planner, transport)
// and wires the handful of cross-component channels the composition root
// owns because no two components are allowed to hold direct references to
// each other beyond what §2 specifies (see `app_state`'s module doc).
// =============================================================================

mod api;
mod app_state;
mod clock;
mod config;
mod drift;
mod errors;
mod gateway;
mod ledger;
mod market_data;
mod planner;
mod replay_guard;
mod safety;
mod transport;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::clock::{Clock, SystemClock};
use crate::config::RuntimeConfig;
use crate::drift::DriftMonitor;
use crate::gateway::{binance::BinanceAdapter, mock::MockAdapter, VenueAdapter, VenueGateway};
use crate::ledger::ShadowLedger;
use crate::market_data::L2SnapshotProvider;
use crate::planner::Planner;
use crate::replay_guard::ReplayGuard;
use crate::safety::SafetyEnvelope;
use crate::transport::SignalTransport;

/// Mirror the drift monitor's state onto the safety envelope's external-block
/// slot (§2, §4.7): NORMAL clears it, SAFETY_STOP and HARD_KILL each map to
/// their own `BlockReason` so a blocked PREPARE/CONFIRM reports which
/// escalation is active. Idempotent — safe to call on every sample tick.
fn sync_drift_block(drift: &DriftMonitor, safety: &SafetyEnvelope) {
    use crate::drift::DriftState;
    use crate::errors::BlockReason;
    let reason = match drift.state() {
        DriftState::Normal => None,
        DriftState::SafetyStop => Some(BlockReason::SafetyStopActive),
        DriftState::HardKill => Some(BlockReason::HardKillActive),
    };
    safety.set_external_block(reason);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("execution-core starting up");

    // ── 1. Data directory & config ───────────────────────────────────────
    let data_dir: PathBuf = std::env::var("EXEC_CORE_DATA_DIR")
        .unwrap_or_else(|_| "./data".to_string())
        .into();
    std::fs::create_dir_all(&data_dir)?;

    let config_path = data_dir.join("config.json");
    let config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path.display(), "failed to load config, using defaults");
        RuntimeConfig::default()
    });

    info!(armed = config.armed, "runtime config ready");

    // ── 2. Clock (§10.5) ──────────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    // ── 3. C4 Replay Guard — no dependencies ─────────────────────────────
    let replay_guard = Arc::new(ReplayGuard::new(
        config.replay_guard_ttl_ms,
        config.replay_guard_capacity,
        clock.clone(),
    ));

    // ── 4. C3 Shadow-State Ledger — depends on clock ─────────────────────
    let ledger = Arc::new(ShadowLedger::new(clock.clone()));

    // ── 5. C5 Venue Gateway — adapter selection per §4.5 priority ────────
    // The configured venue list walks in order; mock is always appended last
    // as the fallback so the gateway never fully stalls.
    let mut adapters: Vec<(String, Arc<dyn VenueAdapter>)> = Vec::new();
    for venue in &config.gateway.venues {
        if !venue.enabled {
            continue;
        }
        match venue.name.as_str() {
            "binance" => {
                let api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
                let api_secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();
                if api_key.is_empty() || api_secret.is_empty() {
                    warn!("binance venue configured but BINANCE_API_KEY/SECRET unset, skipping");
                    continue;
                }
                adapters.push((
                    "binance".to_string(),
                    Arc::new(BinanceAdapter::new(api_key, api_secret)),
                ));
            }
            "mock" => {
                adapters.push(("mock".to_string(), Arc::new(MockAdapter::default())));
            }
            other => warn!(venue = other, "unknown venue in config, skipping"),
        }
    }
    if adapters.is_empty() || adapters.last().map(|(n, _)| n.as_str()) != Some("mock") {
        adapters.push(("mock".to_string(), Arc::new(MockAdapter::default())));
    }

    let gateway = Arc::new(VenueGateway::new(
        adapters,
        data_dir.join("orders.log"),
        config.gateway.max_retry_attempts,
    ));
    info!(venues = ?gateway.all_venue_names(), active = %gateway.active_venue_name(), "venue gateway ready");

    match gateway.reconcile_on_boot().await {
        Ok(report) => info!(
            orphaned_in_log = report.orphaned_in_log.len(),
            unlogged_on_venue = report.unlogged_on_venue.len(),
            "boot reconciliation complete"
        ),
        Err(e) => warn!(error = %e, "boot reconciliation failed, continuing with empty reconciliation report"),
    }

    // Seed starting equity from the active venue if it reports one, else
    // fall back to a nominal figure the first equity-sampling tick corrects.
    let starting_equity = match gateway.get_account().await {
        Ok(account) => account.equity,
        Err(e) => {
            warn!(error = %e, "could not fetch initial account equity, using nominal starting equity");
            Decimal::from(10_000)
        }
    };

    // ── 6. C6 Safety Envelope — depends on C3 (forced close), C5 (flatten), clock ──
    let safety = Arc::new(SafetyEnvelope::new(
        config.armed,
        config.safety.n_loss,
        config.safety.cooldown_ms,
        config.safety.daily_drawdown_pct,
        config.safety.weekly_drawdown_pct,
        starting_equity,
        clock.clone(),
    ));

    // ── 7. C7 Drift Monitor — depends on C3 (equity), C5 (flatten), C6 (raise kill) ──
    let drift = Arc::new(DriftMonitor::new(
        config.safety.drift_ring_capacity,
        config.safety.z_threshold,
        config.safety.z_expected_mean,
        config.safety.z_expected_stddev,
        config.safety.velocity_window_ms,
        config.safety.velocity_threshold_pct,
    ));

    // ── 8. Market data snapshot cache ────────────────────────────────────
    let market_data = Arc::new(L2SnapshotProvider::new());

    // ── 9. C2 Handler/Planner — depends on C3, C4, C5, C6 ────────────────
    let (trade_tx, mut trade_rx) = tokio::sync::mpsc::unbounded_channel();
    let planner = Arc::new(Planner::new(
        ledger.clone(),
        replay_guard.clone(),
        safety.clone(),
        gateway.clone(),
        market_data.clone(),
        clock.clone(),
        config.planner.clone(),
        starting_equity,
        trade_tx,
    ));

    // ── 10. C1 Signal Transport — depends on C2 ──────────────────────────
    let transport_secret = std::env::var("EXEC_CORE_TRANSPORT_SECRET")
        .unwrap_or_else(|_| {
            warn!("EXEC_CORE_TRANSPORT_SECRET not set, using an empty shared secret");
            String::new()
        })
        .into_bytes();

    let transport = Arc::new(SignalTransport::new(
        config.transport.socket_path.clone(),
        config.transport.max_connections,
        config.transport.shutdown_grace_ms,
        transport_secret,
        planner.clone(),
    ));
    let transport_metrics = transport.metrics();

    // ── 11. Operator proposal authority (§4.6.1) ─────────────────────────
    let proposal_verifying_key = std::env::var("EXEC_CORE_OPERATOR_PUBKEY")
        .ok()
        .and_then(|hex_key| {
            let bytes = hex::decode(hex_key.trim()).ok()?;
            let arr: [u8; 32] = bytes.try_into().ok()?;
            VerifyingKey::from_bytes(&arr).ok()
        });
    if proposal_verifying_key.is_none() {
        warn!("EXEC_CORE_OPERATOR_PUBKEY unset or invalid, signed proposals will be rejected");
    }

    // ── 12. Composition root ─────────────────────────────────────────────
    let state = Arc::new(AppState::new(
        config.clone(),
        config_path,
        clock.clone(),
        ledger.clone(),
        replay_guard.clone(),
        safety.clone(),
        gateway.clone(),
        market_data.clone(),
        planner.clone(),
        drift.clone(),
        transport_metrics,
        proposal_verifying_key,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // ── 13. Background loop: stale-intent sweeper (§4.2, PreparedIntent TTL) ──
    {
        let ledger = ledger.clone();
        let prepare_ttl_ms = config.planner.prepare_ttl_ms;
        tokio::spawn(async move {
            planner::sweeper::run_stale_intent_sweeper(ledger, prepare_ttl_ms).await;
        });
    }

    // ── 14. Background loop: equity sampling — feeds C6 and C7 (§2, §4.7) ──
    // A flash-crash breach here escalates the drift monitor to HARD_KILL and
    // (§4.7) must invoke `flatten_all` and disable auto-execution in the same
    // beat — this is the one place C7 reaches into C6, since neither
    // component holds a direct reference to the other (§9 composition root
    // wires narrow channels instead of cross-component handles).
    {
        let gateway = gateway.clone();
        let ledger = ledger.clone();
        let safety = safety.clone();
        let drift = drift.clone();
        let planner = planner.clone();
        let clock = clock.clone();
        let sample_interval_ms = config.safety.velocity_sample_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(sample_interval_ms));
            loop {
                interval.tick().await;
                match gateway.get_account().await {
                    Ok(account) => {
                        planner.set_equity(account.equity);
                        safety.observe_equity(account.equity);
                        let just_hard_killed = drift.observe_equity(account.equity, clock.monotonic_ms());
                        sync_drift_block(&drift, &safety);
                        if just_hard_killed {
                            error!("HARD_KILL triggered — flattening all positions");
                            let records = crate::safety::flatten_all(
                                &safety,
                                &gateway,
                                &ledger,
                                "FLASH_CRASH_PROTECTION: drift monitor HARD_KILL",
                            )
                            .await;
                            warn!(closed = records.len(), "flatten_all complete after HARD_KILL");
                        }
                    }
                    Err(e) => warn!(error = %e, "equity sampling tick failed"),
                }
            }
        });
    }

    // ── 14b. Background loops: roll the gateway's rate-limit windows over
    // (§4.5.1) — the 10s order-count window and the daily one, each on its
    // own cadence, since nothing else in the gateway carries a clock of its
    // own for this.
    {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
            loop {
                interval.tick().await;
                gateway.roll_10s_rate_windows();
            }
        });
    }
    {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
            loop {
                interval.tick().await;
                gateway.roll_daily_rate_windows();
            }
        });
    }

    // ── 15. Background loop: closed-trade fan-out — Planner -> C6 + C7 ───
    // (§9: the planner can't call the drift monitor directly; this narrow
    // channel drain is the only place the two are coupled.)
    {
        let safety = safety.clone();
        let drift = drift.clone();
        tokio::spawn(async move {
            while let Some(record) = trade_rx.recv().await {
                let won = record.pnl_usd.is_sign_positive() && !record.pnl_usd.is_zero();
                safety.record_trade(won);
                drift.record_trade_pnl(record.pnl_usd.to_f64().unwrap_or(0.0));
                sync_drift_block(&drift, &safety);
                info!(
                    symbol = %record.symbol,
                    pnl_usd = %record.pnl_usd,
                    exit_reason = ?record.exit_reason,
                    "trade closed"
                );
            }
        });
    }

    // ── 16. Signal transport server (C1) ─────────────────────────────────
    {
        let transport = transport.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.run(shutdown_rx).await {
                error!(error = %e, "signal transport exited with error");
            }
        });
    }

    // ── 17. Admin REST API ────────────────────────────────────────────────
    {
        let api_state = state.clone();
        let bind_addr = std::env::var("EXEC_CORE_ADMIN_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());
        tokio::spawn(async move {
            let app = api::rest::router(api_state);
            let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, addr = %bind_addr, "failed to bind admin API");
                    return;
                }
            };
            info!(addr = %bind_addr, "admin API listening");
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "admin API server failed");
            }
        });
    }

    info!("execution-core subsystems running, awaiting shutdown signal");

    // ── 18. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, draining transport");

    let _ = shutdown_tx.send(true);
    tokio::time::sleep(std::time::Duration::from_millis(config.transport.shutdown_grace_ms)).await;

    if let Err(e) = state.save_config() {
        error!(error = %e, "failed to persist config on shutdown");
    }

    info!("execution-core shut down complete");
    Ok(())
}
