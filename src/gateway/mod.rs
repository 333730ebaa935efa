// =============================================================================
// Venue Gateway (C5, §4.5)
// =============================================================================
//
// Owns adapter selection, runtime venue switching, per-venue rate limiting,
// the signed-order log, and bounded retry for `Transient` failures. The
// planner and safety envelope talk to this, never to a concrete adapter.
// =============================================================================

pub mod adapter;
pub mod binance;
pub mod mock;
pub mod order_log;
pub mod rate_limit;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use rand::Rng;
use tracing::{error, info, instrument, warn};

pub use adapter::{
    AccountInfo, HealthStatus, OrderKind, OrderRequest, OrderResult, VenueAdapter, VenuePosition,
};
pub use order_log::{OrderLog, OrderLogEntry, ReconcileReport};
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};

/// One entry in the gateway's priority-ordered adapter list. §4.5: "switching
/// adapters at runtime" walks this list from index 0; the last entry is
/// always a mock fallback so the gateway degrades to a harmless no-op venue
/// rather than stalling entirely when every real venue is unreachable.
struct VenueSlot {
    name: String,
    adapter: Arc<dyn VenueAdapter>,
    limiter: RateLimitTracker,
}

pub struct VenueGateway {
    slots: Vec<VenueSlot>,
    active: AtomicUsize,
    /// Held for the duration of a venue swap so no order is sent mid-swap.
    swap_lock: RwLock<()>,
    order_log: OrderLog,
    max_retry_attempts: u32,
}

impl VenueGateway {
    pub fn new(
        adapters: Vec<(String, Arc<dyn VenueAdapter>)>,
        order_log_path: impl Into<std::path::PathBuf>,
        max_retry_attempts: u32,
    ) -> Self {
        let slots = adapters
            .into_iter()
            .map(|(name, adapter)| {
                let limiter = RateLimitTracker::new(name.clone());
                VenueSlot { name, adapter, limiter }
            })
            .collect();

        Self {
            slots,
            active: AtomicUsize::new(0),
            swap_lock: RwLock::new(()),
            order_log: OrderLog::new(order_log_path),
            max_retry_attempts,
        }
    }

    fn active_slot(&self) -> &VenueSlot {
        let _guard = self.swap_lock.read();
        let idx = self.active.load(Ordering::Acquire);
        &self.slots[idx.min(self.slots.len() - 1)]
    }

    pub fn active_venue_name(&self) -> &str {
        &self.active_slot().name
    }

    /// Quiesce (block new sends behind the swap lock), swap the active slot,
    /// resume. §4.5: "switching adapters at runtime must not drop in-flight
    /// orders" — callers are expected to have drained in-flight sends via
    /// their own bookkeeping before calling this; the lock here only
    /// prevents a *new* send from racing the index flip.
    #[instrument(skip(self))]
    pub fn switch_to(&self, venue_name: &str) -> Result<()> {
        let _guard = self.swap_lock.write();
        let idx = self
            .slots
            .iter()
            .position(|s| s.name == venue_name)
            .with_context(|| format!("no venue slot named '{venue_name}'"))?;
        self.active.store(idx, Ordering::Release);
        info!(venue = venue_name, "venue gateway switched active adapter");
        Ok(())
    }

    /// Fall back to the mock adapter, which by convention is the last slot.
    pub fn fall_back_to_mock(&self) {
        let _guard = self.swap_lock.write();
        let idx = self.slots.len() - 1;
        self.active.store(idx, Ordering::Release);
        warn!(venue = %self.slots[idx].name, "venue gateway fell back to mock adapter");
    }

    pub fn rate_limit_snapshots(&self) -> Vec<RateLimitSnapshot> {
        self.slots.iter().map(|s| s.limiter.snapshot()).collect()
    }

    /// Roll every venue's 10-second order-count window over. Driven by a
    /// fixed-interval background task (§4.5.1) rather than lazily, since the
    /// counter has no timestamp of its own to compare against.
    pub fn roll_10s_rate_windows(&self) {
        for slot in &self.slots {
            slot.limiter.reset_10s_counter();
        }
    }

    /// Roll every venue's daily order-count window over.
    pub fn roll_daily_rate_windows(&self) {
        for slot in &self.slots {
            slot.limiter.reset_daily_counter();
        }
    }

    /// Send an order against the active venue, retrying `Transient`-looking
    /// failures with bounded exponential backoff and jitter. A failure whose
    /// message doesn't look transient (rejection, auth failure) is returned
    /// immediately rather than retried — retrying a rejection only delays
    /// the operator finding out about it.
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn send_order(&self, request: OrderRequest) -> Result<OrderResult> {
        let slot_name = self.active_slot().name.clone();

        if !self.active_slot().limiter.can_place_order() {
            anyhow::bail!("rate limit reached for venue '{}'", slot_name);
        }

        let mut attempt = 0u32;
        loop {
            let slot = self.active_slot();
            slot.limiter.record_order_sent();

            self.order_log.append(&OrderLogEntry {
                client_order_id: request.client_order_id.clone(),
                broker_order_id: None,
                symbol: request.symbol.clone(),
                venue: slot.name.clone(),
                sent_at: chrono::Utc::now().to_rfc3339(),
                status: "SENT".to_string(),
            })?;

            match slot.adapter.send_order(request.clone()).await {
                Ok(result) => {
                    self.order_log.append(&OrderLogEntry {
                        client_order_id: request.client_order_id.clone(),
                        broker_order_id: result.broker_order_id.clone(),
                        symbol: request.symbol.clone(),
                        venue: slot.name.clone(),
                        sent_at: chrono::Utc::now().to_rfc3339(),
                        status: result.status.clone(),
                    })?;
                    return Ok(result);
                }
                Err(e) if attempt < self.max_retry_attempts && is_transient(&e) => {
                    attempt += 1;
                    let backoff_ms = backoff_with_jitter(attempt);
                    warn!(
                        venue = %slot.name,
                        attempt,
                        backoff_ms,
                        error = %e,
                        "transient order send failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => {
                    error!(venue = %slot.name, error = %e, "order send failed");
                    return Err(e);
                }
            }
        }
    }

    pub async fn get_account(&self) -> Result<AccountInfo> {
        self.active_slot().adapter.get_account().await
    }

    pub async fn get_positions(&self) -> Result<Vec<VenuePosition>> {
        self.active_slot().adapter.get_positions().await
    }

    pub async fn close_position(&self, symbol: &str) -> Result<OrderResult> {
        self.active_slot().adapter.close_position(symbol).await
    }

    pub async fn close_all_positions(&self) -> Result<Vec<OrderResult>> {
        self.active_slot().adapter.close_all_positions().await
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.active_slot().adapter.cancel_order(order_id).await
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        self.active_slot().adapter.health_check().await
    }

    pub async fn reconcile_on_boot(&self) -> Result<ReconcileReport> {
        self.order_log
            .reconcile_on_boot(self.active_slot().adapter.as_ref())
            .await
    }

    /// Every venue behind this gateway, in priority order — used to
    /// health-check the full list, not just the active one.
    pub fn all_venue_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name.clone()).collect()
    }

    pub async fn health_check_all(&self) -> HashMap<String, HealthStatus> {
        let mut results = HashMap::new();
        for slot in &self.slots {
            let status = slot
                .adapter
                .health_check()
                .await
                .unwrap_or_else(|e| HealthStatus {
                    success: false,
                    error: Some(e.to_string()),
                });
            results.insert(slot.name.clone(), status);
        }
        results
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection")
        || msg.contains("request failed")
}

/// Exponential backoff with full jitter, capped at 8s, starting at ~200ms.
fn backoff_with_jitter(attempt: u32) -> u64 {
    let base: u64 = 200u64.saturating_mul(1u64 << attempt.min(5));
    let capped = base.min(8_000);
    rand::thread_rng().gen_range(0..=capped)
}
