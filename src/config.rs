// =============================================================================
// Runtime Configuration — hot-reloadable execution-core settings
// =============================================================================
//
// Every tunable named in §6 lives here, loaded once at startup from
// `<data_dir>/config.json` and thereafter only mutated through a signed
// PARAM_UPDATE proposal (§4.6.1) applied as a partial merge under the single
// writer lock in `AppState`.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_true() -> bool {
    true
}

fn default_update_interval_ms() -> u64 {
    60_000
}

fn default_top_symbols_count() -> u32 {
    10
}

fn default_min_confidence() -> f64 {
    60.0
}

fn default_min_trades_in_100ms() -> u32 {
    3
}

fn default_volume_window_ms() -> u64 {
    100
}

fn default_extreme_velocity_threshold() -> f64 {
    0.005
}

fn default_moderate_velocity_threshold() -> f64 {
    0.001
}

fn default_aggressive_limit_markup() -> f64 {
    0.0
}

fn default_max_leverage() -> f64 {
    20.0
}

fn default_max_position_size_pct() -> f64 {
    0.2
}

fn default_stop_loss_pct() -> f64 {
    1.0
}

fn default_target_pct() -> f64 {
    1.5
}

fn default_risk_pct() -> f64 {
    0.02
}

fn default_min_position_usd() -> f64 {
    10.0
}

fn default_prepare_ttl_ms() -> i64 {
    10_000
}

fn default_replay_guard_ttl_ms() -> i64 {
    60_000
}

fn default_replay_guard_capacity() -> usize {
    10_000
}

fn default_n_loss() -> u32 {
    3
}

fn default_cooldown_ms() -> i64 {
    4 * 60 * 60 * 1000
}

fn default_daily_drawdown_pct() -> f64 {
    0.05
}

fn default_weekly_drawdown_pct() -> f64 {
    0.10
}

fn default_z_threshold() -> f64 {
    -2.0
}

fn default_drift_ring_capacity() -> usize {
    30
}

/// Pre-registered calibration baseline (§4.7: "a pre-registered
/// (expected_mean, expected_stddev) from prior calibration"). Zero mean with
/// unit stddev is a deliberately inert default — an operator replaces these
/// via `reset(new_params)` once a real calibration run has produced figures
/// for the strategy actually trading, rather than this shipping a baseline
/// that would trip on day one for an arbitrary strategy's PnL distribution.
fn default_z_expected_mean() -> f64 {
    0.0
}

fn default_z_expected_stddev() -> f64 {
    1.0
}

fn default_velocity_threshold_pct() -> f64 {
    0.02
}

fn default_velocity_window_ms() -> i64 {
    5 * 60 * 1000
}

fn default_velocity_sample_interval_ms() -> u64 {
    10_000
}

fn default_max_connections() -> usize {
    10
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_max_retry_attempts() -> u32 {
    3
}

/// Planner-facing tunables (§4.2, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerParams {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_min_trades_in_100ms")]
    pub min_trades_in_100ms: u32,
    #[serde(default = "default_volume_window_ms")]
    pub volume_window_ms: u64,
    #[serde(default = "default_extreme_velocity_threshold")]
    pub extreme_velocity_threshold: f64,
    #[serde(default = "default_moderate_velocity_threshold")]
    pub moderate_velocity_threshold: f64,
    #[serde(default = "default_aggressive_limit_markup")]
    pub aggressive_limit_markup: f64,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: f64,
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_target_pct")]
    pub target_pct: f64,
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,
    #[serde(default = "default_min_position_usd")]
    pub min_position_usd: f64,
    #[serde(default = "default_prepare_ttl_ms")]
    pub prepare_ttl_ms: i64,
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_trades_in_100ms: default_min_trades_in_100ms(),
            volume_window_ms: default_volume_window_ms(),
            extreme_velocity_threshold: default_extreme_velocity_threshold(),
            moderate_velocity_threshold: default_moderate_velocity_threshold(),
            aggressive_limit_markup: default_aggressive_limit_markup(),
            max_leverage: default_max_leverage(),
            max_position_size_pct: default_max_position_size_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            target_pct: default_target_pct(),
            risk_pct: default_risk_pct(),
            min_position_usd: default_min_position_usd(),
            prepare_ttl_ms: default_prepare_ttl_ms(),
        }
    }
}

/// Safety-envelope tunables (§4.6, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyParams {
    #[serde(default = "default_n_loss")]
    pub n_loss: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: i64,
    #[serde(default = "default_daily_drawdown_pct")]
    pub daily_drawdown_pct: f64,
    #[serde(default = "default_weekly_drawdown_pct")]
    pub weekly_drawdown_pct: f64,
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    #[serde(default = "default_drift_ring_capacity")]
    pub drift_ring_capacity: usize,
    #[serde(default = "default_z_expected_mean")]
    pub z_expected_mean: f64,
    #[serde(default = "default_z_expected_stddev")]
    pub z_expected_stddev: f64,
    #[serde(default = "default_velocity_threshold_pct")]
    pub velocity_threshold_pct: f64,
    #[serde(default = "default_velocity_window_ms")]
    pub velocity_window_ms: i64,
    #[serde(default = "default_velocity_sample_interval_ms")]
    pub velocity_sample_interval_ms: u64,
}

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            n_loss: default_n_loss(),
            cooldown_ms: default_cooldown_ms(),
            daily_drawdown_pct: default_daily_drawdown_pct(),
            weekly_drawdown_pct: default_weekly_drawdown_pct(),
            z_threshold: default_z_threshold(),
            drift_ring_capacity: default_drift_ring_capacity(),
            z_expected_mean: default_z_expected_mean(),
            z_expected_stddev: default_z_expected_stddev(),
            velocity_threshold_pct: default_velocity_threshold_pct(),
            velocity_window_ms: default_velocity_window_ms(),
            velocity_sample_interval_ms: default_velocity_sample_interval_ms(),
        }
    }
}

/// Per-venue configuration (§6 `exchanges.{venue}.{enabled, execute_on}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub execute_on: bool,
}

/// Transport tunables (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportParams {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default)]
    pub socket_path: String,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            socket_path: "exec.sock".to_string(),
        }
    }
}

/// Venue-gateway tunables (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayParams {
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
}

impl Default for GatewayParams {
    fn default() -> Self {
        Self {
            http_timeout_ms: default_http_timeout_ms(),
            max_retry_attempts: default_max_retry_attempts(),
            venues: vec![VenueConfig {
                name: "mock".to_string(),
                enabled: true,
                execute_on: true,
            }],
        }
    }
}

/// Top-level runtime configuration for the execution core.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Master arm: no new orders are submitted while this is `false`.
    #[serde(default)]
    pub armed: bool,

    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_top_symbols_count")]
    pub top_symbols_count: u32,

    #[serde(default = "default_replay_guard_ttl_ms")]
    pub replay_guard_ttl_ms: i64,

    #[serde(default = "default_replay_guard_capacity")]
    pub replay_guard_capacity: usize,

    #[serde(default)]
    pub planner: PlannerParams,

    #[serde(default)]
    pub safety: SafetyParams,

    #[serde(default)]
    pub transport: TransportParams,

    #[serde(default)]
    pub gateway: GatewayParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            armed: false,
            update_interval_ms: default_update_interval_ms(),
            top_symbols_count: default_top_symbols_count(),
            replay_guard_ttl_ms: default_replay_guard_ttl_ms(),
            replay_guard_capacity: default_replay_guard_capacity(),
            planner: PlannerParams::default(),
            safety: SafetyParams::default(),
            transport: TransportParams::default(),
            gateway: GatewayParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(path = %path.display(), armed = config.armed, "runtime config loaded");

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply a PARAM_UPDATE proposal's JSON payload as a partial merge onto
    /// this config. Unknown fields are ignored; unspecified fields retain
    /// their current value (§4.6.1, §6 "Configuration options").
    pub fn apply_param_update(&mut self, patch: &serde_json::Value) -> Result<()> {
        let mut current = serde_json::to_value(&*self).context("serialise current config")?;
        merge_json(&mut current, patch);
        *self = serde_json::from_value(current).context("patched config failed validation")?;
        Ok(())
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                merge_json(base_map.entry(k.clone()).or_insert(serde_json::Value::Null), v);
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}
