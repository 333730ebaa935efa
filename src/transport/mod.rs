// =============================================================================
// Signal Transport (C1, §4.1)
// =============================================================================
//
// Local UNIX domain socket RPC carrying PREPARE/CONFIRM/ABORT signals from
// strategy producers to the Planner (C2). Framing is newline-delimited UTF-8
// JSON; each inbound message is `{signal, signature}` where `signature` is
// lowercase hex HMAC-SHA256 over the canonical serialisation of `signal`
// (`serde_json::to_vec`, struct-declaration field order — the same
// canonicalisation rule as the signed proposal envelope in `safety::proposal`,
// so both wire contracts are verified the same way).
//
// The socket path is a singleton (§5): a stale file from a prior, unclean
// shutdown is removed at bind time, and the path is unlinked again on
// shutdown.
// =============================================================================

use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::errors::TransportRejectReason;
use crate::planner::Planner;
use crate::types::{Signal, SignalKind};

type HmacSha256 = Hmac<Sha256>;

/// Inbound wire message (§6 "Local-socket wire protocol").
#[derive(Debug, Deserialize)]
struct InboundMessage {
    signal: Signal,
    signature: String,
}

/// Compare two byte slices in constant time, independent of where a mismatch
/// first occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Recompute the HMAC-SHA256 over `signal`'s canonical bytes and compare
/// against the hex-decoded `signature`. Rejects signatures that don't decode
/// to exactly 32 bytes before ever comparing (§4.1 verification).
fn verify_signature(secret: &[u8], signal: &Signal, signature_hex: &str) -> bool {
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    if sig_bytes.len() != 32 {
        return false;
    }
    let Ok(canonical) = serde_json::to_vec(signal) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(&canonical);
    let expected = mac.finalize().into_bytes();
    constant_time_eq(&expected, &sig_bytes)
}

/// Running counters and latency statistics (§4.1 "Metrics (observable)").
#[derive(Default)]
pub struct TransportMetrics {
    messages_received: AtomicU64,
    messages_processed: AtomicU64,
    messages_failed: AtomicU64,
    invalid_signatures: AtomicU64,
    latency_min_ms: AtomicI64,
    latency_max_ms: AtomicI64,
    latency_sum_ms: AtomicI64,
    latency_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TransportMetricsSnapshot {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub invalid_signatures: u64,
    pub latency_min_ms: Option<i64>,
    pub latency_max_ms: Option<i64>,
    pub latency_mean_ms: Option<f64>,
}

impl TransportMetrics {
    fn new() -> Self {
        Self {
            latency_min_ms: AtomicI64::new(i64::MAX),
            latency_max_ms: AtomicI64::new(i64::MIN),
            ..Default::default()
        }
    }

    fn record_latency(&self, ms: i64) {
        self.latency_min_ms.fetch_min(ms, Ordering::Relaxed);
        self.latency_max_ms.fetch_max(ms, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportMetricsSnapshot {
        let count = self.latency_count.load(Ordering::Relaxed);
        let (min, max, mean) = if count == 0 {
            (None, None, None)
        } else {
            (
                Some(self.latency_min_ms.load(Ordering::Relaxed)),
                Some(self.latency_max_ms.load(Ordering::Relaxed)),
                Some(self.latency_sum_ms.load(Ordering::Relaxed) as f64 / count as f64),
            )
        };
        TransportMetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            invalid_signatures: self.invalid_signatures.load(Ordering::Relaxed),
            latency_min_ms: min,
            latency_max_ms: max,
            latency_mean_ms: mean,
        }
    }
}

/// Local-socket server handing validated signals to the Planner (§4.1).
pub struct SignalTransport {
    socket_path: String,
    max_connections: usize,
    shutdown_grace_ms: u64,
    secret: Vec<u8>,
    planner: Arc<Planner>,
    metrics: Arc<TransportMetrics>,
}

impl SignalTransport {
    pub fn new(
        socket_path: impl Into<String>,
        max_connections: usize,
        shutdown_grace_ms: u64,
        secret: Vec<u8>,
        planner: Arc<Planner>,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_connections,
            shutdown_grace_ms,
            secret,
            planner,
            metrics: Arc::new(TransportMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<TransportMetrics> {
        self.metrics.clone()
    }

    /// Bind the socket and accept connections until `shutdown_rx` fires,
    /// then drain in-flight connections for up to `shutdown_grace_ms` before
    /// forcibly returning and unlinking the socket path (§4.1 shutdown, §5).
    #[instrument(skip(self, shutdown_rx), fields(socket_path = %self.socket_path))]
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        let path = Path::new(&self.socket_path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let listener = UnixListener::bind(path)?;
        info!(max_connections = self.max_connections, "signal transport listening");

        let connection_slots = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }

                accepted = listener.accept() => {
                    let (stream, _addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    match connection_slots.clone().try_acquire_owned() {
                        Ok(permit) => {
                            let planner = self.planner.clone();
                            let secret = self.secret.clone();
                            let metrics = self.metrics.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                handle_connection(stream, secret, planner, metrics).await;
                            });
                        }
                        Err(_) => {
                            warn!("max connections reached, refusing new connection");
                            tokio::spawn(reject_max_connections(stream));
                        }
                    }
                }
            }
        }

        info!("signal transport draining in-flight connections");
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(self.shutdown_grace_ms);
        while connection_slots.available_permits() < self.max_connections {
            if tokio::time::Instant::now() >= deadline {
                warn!("shutdown grace period elapsed with connections still in flight");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }

        let _ = std::fs::remove_file(path);
        info!("signal transport shut down");
        Ok(())
    }
}

/// Refuse a connection immediately with `MAX_CONNECTIONS_REACHED` and close it.
async fn reject_max_connections(mut stream: UnixStream) {
    let reply = serde_json::json!({
        "rejected": true,
        "reason": TransportRejectReason::MaxConnectionsReached.to_string(),
    });
    if let Ok(mut line) = serde_json::to_vec(&reply) {
        line.push(b'\n');
        let _ = stream.write_all(&line).await;
    }
}

#[instrument(skip(stream, secret, planner, metrics))]
async fn handle_connection(
    stream: UnixStream,
    secret: Vec<u8>,
    planner: Arc<Planner>,
    metrics: Arc<TransportMetrics>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "connection read error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
        let read_complete = Instant::now();

        let reply = dispatch_message(&line, &secret, &planner, &metrics).await;

        let ipc_latency_ms = read_complete.elapsed().as_millis() as i64;
        metrics.record_latency(ipc_latency_ms);

        let mut reply = reply;
        if let serde_json::Value::Object(ref mut map) = reply {
            map.insert("ipc_latency_ms".to_string(), serde_json::json!(ipc_latency_ms));
        }

        let Ok(mut bytes) = serde_json::to_vec(&reply) else {
            metrics.messages_failed.fetch_add(1, Ordering::Relaxed);
            break;
        };
        bytes.push(b'\n');

        // `write_all` suspends until the socket is writable again, honouring
        // backpressure rather than buffering unboundedly (§4.1 "Processing").
        if writer.write_all(&bytes).await.is_err() {
            break;
        }
    }
}

async fn dispatch_message(
    line: &str,
    secret: &[u8],
    planner: &Arc<Planner>,
    metrics: &Arc<TransportMetrics>,
) -> serde_json::Value {
    let inbound: InboundMessage = match serde_json::from_str(line) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "malformed inbound message");
            metrics.messages_failed.fetch_add(1, Ordering::Relaxed);
            return serde_json::json!({
                "rejected": true,
                "reason": TransportRejectReason::IpcError.to_string(),
            });
        }
    };

    if !verify_signature(secret, &inbound.signal, &inbound.signature) {
        metrics.invalid_signatures.fetch_add(1, Ordering::Relaxed);
        metrics.messages_failed.fetch_add(1, Ordering::Relaxed);
        warn!(signal_id = %inbound.signal.signal_id, "invalid signature");
        return serde_json::json!({
            "rejected": true,
            "reason": TransportRejectReason::InvalidSignature.to_string(),
        });
    }

    let response = match inbound.signal.kind {
        SignalKind::Prepare => planner.prepare(inbound.signal),
        SignalKind::Confirm => planner.confirm(&inbound.signal.signal_id).await,
        SignalKind::Abort => planner.abort(&inbound.signal.signal_id),
    };

    metrics.messages_processed.fetch_add(1, Ordering::Relaxed);
    serde_json::to_value(response).unwrap_or_else(|_| serde_json::json!({ "error": "serialisation failure" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal() -> Signal {
        Signal {
            signal_id: "s1".to_string(),
            kind: SignalKind::Prepare,
            symbol: "BTCUSDT".to_string(),
            direction: Some(crate::types::Direction::Long),
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

    #[test]
    fn accepts_correctly_signed_message() {
        let secret = b"top-secret".to_vec();
        let sig = signal();
        let canonical = serde_json::to_vec(&sig).unwrap();
        let mut mac = HmacSha256::new_from_slice(&secret).unwrap();
        mac.update(&canonical);
        let hex_sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature(&secret, &sig, &hex_sig));
    }

    #[test]
    fn rejects_wrong_signature() {
        let secret = b"top-secret".to_vec();
        let sig = signal();
        assert!(!verify_signature(&secret, &sig, &"00".repeat(32)));
    }

    #[test]
    fn rejects_signature_with_wrong_byte_length() {
        let secret = b"top-secret".to_vec();
        let sig = signal();
        assert!(!verify_signature(&secret, &sig, "deadbeef"));
    }

    #[test]
    fn rejects_malformed_hex() {
        let secret = b"top-secret".to_vec();
        let sig = signal();
        assert!(!verify_signature(&secret, &sig, "not-hex-at-all!!"));
    }

    #[test]
    fn constant_time_eq_matches_identical_and_rejects_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn metrics_snapshot_reports_latency_bounds() {
        let metrics = TransportMetrics::new();
        metrics.record_latency(5);
        metrics.record_latency(15);
        metrics.record_latency(10);
        let snap = metrics.snapshot();
        assert_eq!(snap.latency_min_ms, Some(5));
        assert_eq!(snap.latency_max_ms, Some(15));
        assert_eq!(snap.latency_mean_ms, Some(10.0));
    }

    #[test]
    fn metrics_snapshot_empty_before_any_latency_recorded() {
        let metrics = TransportMetrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.latency_min_ms, None);
        assert_eq!(snap.messages_received, 0);
    }
}
