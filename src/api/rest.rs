// =============================================================================
// Admin REST API — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. `/api/v1/health` requires no
// authentication; every other endpoint requires a valid Bearer token via the
// `AuthBearer` extractor. Mutating endpoints fall into two groups:
//
//   - `POST /api/v1/proposals`: the closed, Ed25519-signed envelope contract
//     of §4.6.1 (PARAM_UPDATE / MODEL_PROMOTION / EMERGENCY_ACTION).
//   - A handful of plain Bearer-gated operational endpoints for actions that
//     aren't in that closed enumeration (drift-monitor reset, circuit-breaker
//     reset, venue switch) — these don't carry capital-moving weight on their
//     own the way an emergency action does, so a signed envelope is not
//     required for them.
//
// CORS is permissive, matching the predecessor's dashboard-facing API.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::errors::BlockReason;
use crate::safety::{apply_emergency_action, flatten_all, verify_proposal, ProposalPayload, SignedProposal, VerifyOutcome};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/positions", get(positions))
        .route("/api/v1/pnl", get(pnl_stats))
        .route("/api/v1/transport/metrics", get(transport_metrics))
        .route("/api/v1/gateway/rate-limits", get(rate_limits))
        .route("/api/v1/gateway/health", get(gateway_health))
        .route("/api/v1/gateway/switch/:venue", post(gateway_switch))
        .route("/api/v1/safety", get(safety_summary))
        .route("/api/v1/safety/circuit-breaker/reset", post(reset_circuit_breaker))
        .route("/api/v1/drift", get(drift_summary))
        .route("/api/v1/drift/reset", post(reset_drift))
        .route("/api/v1/proposals", post(submit_proposal))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    armed: bool,
    active_venue: String,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        armed: state.safety.is_armed(),
        active_venue: state.gateway.active_venue_name().to_string(),
        server_time: state.clock.now_ms(),
    })
}

// =============================================================================
// Positions / PnL (authenticated)
// =============================================================================

async fn positions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.ledger.get_all_positions())
}

#[derive(Deserialize)]
struct PnlQuery {
    #[serde(default = "default_pnl_days")]
    days: i64,
}

fn default_pnl_days() -> i64 {
    7
}

async fn pnl_stats(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PnlQuery>,
) -> impl IntoResponse {
    Json(state.ledger.calc_pnl_stats_over(query.days))
}

// =============================================================================
// Transport / gateway observability (authenticated)
// =============================================================================

async fn transport_metrics(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.transport_metrics.snapshot())
}

async fn rate_limits(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.gateway.rate_limit_snapshots())
}

async fn gateway_health(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.gateway.health_check_all().await)
}

async fn gateway_switch(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(venue): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    state.gateway.switch_to(&venue).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;
    info!(venue, "gateway venue switched via admin API");
    Ok(Json(serde_json::json!({ "active_venue": state.gateway.active_venue_name() })))
}

// =============================================================================
// Safety / drift (authenticated)
// =============================================================================

#[derive(Serialize)]
struct SafetySummary {
    armed: bool,
    reduce_only: bool,
    external_block: Option<BlockReason>,
}

async fn safety_summary(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SafetySummary {
        armed: state.safety.is_armed(),
        reduce_only: state.safety.is_reduce_only(),
        external_block: state.safety.external_block(),
    })
}

async fn reset_circuit_breaker(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.safety.reset_circuit_breaker("admin API request");
    Json(serde_json::json!({ "status": "reset" }))
}

#[derive(Serialize)]
struct DriftSummary {
    state: String,
    last_flash_crash: Option<crate::drift::FlashCrashEvent>,
}

async fn drift_summary(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(DriftSummary {
        state: format!("{:?}", state.drift.state()),
        last_flash_crash: state.drift.last_flash_crash(),
    })
}

#[derive(Deserialize, Default)]
struct DriftResetRequest {
    /// Optional recalibration (§4.7 "reset(new_params?)"): replaces the
    /// z-score detector's `(expected_mean, expected_stddev)` baseline. Left
    /// `None`, the existing calibration carries over unchanged.
    #[serde(default)]
    new_expected_mean: Option<f64>,
    #[serde(default)]
    new_expected_stddev: Option<f64>,
}

async fn reset_drift(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DriftResetRequest>,
) -> impl IntoResponse {
    let new_calibration = match (req.new_expected_mean, req.new_expected_stddev) {
        (Some(mean), Some(stddev)) => Some((mean, stddev)),
        _ => None,
    };
    state.drift.reset("admin API request", new_calibration);
    state.safety.set_external_block(None);
    Json(serde_json::json!({ "status": "reset" }))
}

// =============================================================================
// Signed proposals (authenticated, §4.6.1)
// =============================================================================

async fn submit_proposal(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(proposal): Json<SignedProposal>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let Some(verifying_key) = state.proposal_verifying_key.as_ref() else {
        warn!("proposal submitted but no operator verifying key is configured");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no proposal authority configured" })),
        ));
    };

    match verify_proposal(&proposal, verifying_key) {
        VerifyOutcome::Valid => {}
        VerifyOutcome::InvalidSignature | VerifyOutcome::Malformed => {
            warn!(proposal_id = %proposal.metadata.proposal_id, "rejected proposal with invalid signature");
            return Err((
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "invalid proposal signature" })),
            ));
        }
    }

    info!(
        proposal_id = %proposal.metadata.proposal_id,
        operator = %proposal.metadata.operator,
        "applying verified proposal"
    );

    match proposal.payload {
        ProposalPayload::ParamUpdate { patch } => {
            let mut config = state.config.write();
            if let Err(e) = config.apply_param_update(&patch) {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": format!("patch failed validation: {e}") })),
                ));
            }
            let armed = config.armed;
            drop(config);
            if armed {
                state.safety.arm();
            } else {
                state.safety.disarm("PARAM_UPDATE set armed=false");
            }
            if let Err(e) = state.save_config() {
                warn!(error = %e, "failed to persist config after PARAM_UPDATE");
            }
        }
        ProposalPayload::ModelPromotion { model_id, version } => {
            info!(model_id, version, "model promotion recorded (advisory only)");
        }
        ProposalPayload::EmergencyAction { action } => {
            let is_cancel_all = matches!(action, crate::safety::EmergencyAction::CancelAll);
            let is_halt = matches!(action, crate::safety::EmergencyAction::HaltTrading);
            apply_emergency_action(&state.safety, &action);
            if is_cancel_all || is_halt {
                let records = flatten_all(&state.safety, &state.gateway, &state.ledger, "EMERGENCY_ACTION via proposal").await;
                info!(closed = records.len(), "flatten_all completed for emergency action");
            }
        }
    }

    Ok(Json(serde_json::json!({ "status": "applied" })))
}
