// =============================================================================
// Stale-intent sweeper (§4.2 "Stale-intent sweeper")
// =============================================================================
//
// A periodic task (>= 1 Hz) that removes PreparedIntents whose TTL has
// elapsed, same periodic-tick idiom as the predecessor's exit monitor loop,
// but polling far more frequently since an intent TTL is measured in
// seconds, not minutes.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::ledger::ShadowLedger;

const SWEEP_INTERVAL_MS: u64 = 500;

pub async fn run_stale_intent_sweeper(ledger: Arc<ShadowLedger>, prepare_ttl_ms: i64) {
    info!(
        interval_ms = SWEEP_INTERVAL_MS,
        prepare_ttl_ms, "stale-intent sweeper started"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(SWEEP_INTERVAL_MS));
    loop {
        ticker.tick().await;
        let removed = ledger.sweep_stale_intents(prepare_ttl_ms);
        if !removed.is_empty() {
            debug!(count = removed.len(), signal_ids = ?removed, "swept stale prepared intents");
        }
    }
}
