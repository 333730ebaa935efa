// =============================================================================
// Binance USD-M futures adapter (§4.5)
// =============================================================================
//
// Concrete `VenueAdapter` wrapping the predecessor's HMAC-SHA256 signing
// client, repointed at the futures REST surface (`/fapi/v2`, `/fapi/v1`)
// since this crate trades with leverage. Signing, recv-window, and error
// handling follow the predecessor's spot client exactly; only the endpoint
// set and response shapes differ.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use sha2::Sha256;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

use crate::gateway::adapter::{
    AccountInfo, HealthStatus, OrderKind, OrderRequest, OrderResult, VenueAdapter, VenuePosition,
};
use crate::types::Direction;

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW: u64 = 5000;

#[derive(Clone)]
pub struct BinanceAdapter {
    api_key: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl BinanceAdapter {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();

        let mut default_headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        // §4.5 "IPv4-forced DNS resolution to avoid venue IPv6 whitelist
        // issues": pinning the outgoing socket to an IPv4 local address keeps
        // the OS from ever dialling an AAAA-resolved address for this client.
        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key,
            secret,
            base_url: "https://fapi.binance.com".to_string(),
            client,
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    fn direction_to_side(direction: Direction) -> &'static str {
        match direction {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
        }
    }

    fn order_kind_to_type(kind: OrderKind) -> &'static str {
        match kind {
            OrderKind::Market => "MARKET",
            OrderKind::Limit => "LIMIT",
            OrderKind::PostOnly => "LIMIT",
        }
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn name(&self) -> &str {
        "binance"
    }

    #[instrument(skip(self, request), name = "binance::send_order")]
    async fn send_order(&self, request: OrderRequest) -> Result<OrderResult> {
        let side = Self::direction_to_side(request.side);
        let order_type = Self::order_kind_to_type(request.order_type);

        let mut params = format!(
            "symbol={}&side={}&type={}&quantity={}&newClientOrderId={}",
            request.symbol, side, order_type, request.size_units, request.client_order_id
        );
        if let Some(price) = request.limit_price {
            params.push_str(&format!("&price={price}"));
        }
        if order_type == "LIMIT" {
            let tif = if request.post_only { "GTX" } else { "GTC" };
            params.push_str(&format!("&timeInForce={tif}"));
        }
        if request.reduce_only {
            params.push_str("&reduceOnly=true");
        }

        let qs = self.signed_query(&params);
        let url = format!("{}/fapi/v1/order?{}", self.base_url, qs);

        debug!(symbol = %request.symbol, side, order_type, "sending order to binance futures");

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .context("POST /fapi/v1/order request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse order response")?;

        if !status.is_success() {
            return Ok(OrderResult {
                success: false,
                broker_order_id: None,
                fill_price: None,
                fill_size: None,
                status: "REJECTED".to_string(),
                error: Some(format!("binance returned {status}: {body}")),
            });
        }

        let broker_order_id = body
            .get("orderId")
            .and_then(|v| v.as_u64())
            .map(|id| id.to_string());
        let fill_price = body
            .get("avgPrice")
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok());
        let fill_size = body
            .get("executedQty")
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok());
        let exchange_status = body
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("NEW")
            .to_string();

        Ok(OrderResult {
            success: true,
            broker_order_id,
            fill_price,
            fill_size,
            status: exchange_status,
            error: None,
        })
    }

    #[instrument(skip(self), name = "binance::get_account")]
    async fn get_account(&self) -> Result<AccountInfo> {
        let qs = self.signed_query("");
        let url = format!("{}/fapi/v2/account?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v2/account request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse account response")?;

        if !status.is_success() {
            anyhow::bail!("binance GET /fapi/v2/account returned {}: {}", status, body);
        }

        let parse_dec = |key: &str| -> Decimal {
            body.get(key)
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO)
        };

        Ok(AccountInfo {
            equity: parse_dec("totalMarginBalance"),
            available_balance: parse_dec("availableBalance"),
            unrealized_pnl: parse_dec("totalUnrealizedProfit"),
        })
    }

    #[instrument(skip(self), name = "binance::get_positions")]
    async fn get_positions(&self) -> Result<Vec<VenuePosition>> {
        let qs = self.signed_query("");
        let url = format!("{}/fapi/v2/positionRisk?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v2/positionRisk request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse positionRisk response")?;

        if !status.is_success() {
            anyhow::bail!(
                "binance GET /fapi/v2/positionRisk returned {}: {}",
                status,
                body
            );
        }

        let raw = body.as_array().context("positionRisk response is not an array")?;
        let mut positions = Vec::new();

        for entry in raw {
            let size_units: Decimal = entry
                .get("positionAmt")
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO);

            if size_units.is_zero() {
                continue;
            }

            let symbol = entry
                .get("symbol")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let entry_price = entry
                .get("entryPrice")
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO);
            let unrealized_pnl = entry
                .get("unRealizedProfit")
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO);
            let leverage = entry
                .get("leverage")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(1.0);

            positions.push(VenuePosition {
                symbol,
                side: if size_units.is_sign_positive() {
                    Direction::Long
                } else {
                    Direction::Short
                },
                size_units: size_units.abs(),
                entry_price,
                unrealized_pnl,
                leverage,
            });
        }

        debug!(count = positions.len(), "open positions retrieved from binance");
        Ok(positions)
    }

    #[instrument(skip(self), name = "binance::close_position")]
    async fn close_position(&self, symbol: &str) -> Result<OrderResult> {
        let positions = self.get_positions().await?;
        let Some(pos) = positions.into_iter().find(|p| p.symbol == symbol) else {
            return Ok(OrderResult {
                success: true,
                broker_order_id: None,
                fill_price: None,
                fill_size: None,
                status: "NO_POSITION".to_string(),
                error: None,
            });
        };

        let closing_side = match pos.side {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        };

        self.send_order(OrderRequest {
            symbol: symbol.to_string(),
            side: closing_side,
            size_units: pos.size_units,
            order_type: OrderKind::Market,
            limit_price: None,
            reduce_only: true,
            post_only: false,
            client_order_id: format!("close-{}", uuid::Uuid::new_v4()),
        })
        .await
    }

    #[instrument(skip(self), name = "binance::close_all_positions")]
    async fn close_all_positions(&self) -> Result<Vec<OrderResult>> {
        let positions = self.get_positions().await?;
        let mut results = Vec::with_capacity(positions.len());
        for pos in positions {
            match self.close_position(&pos.symbol).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(symbol = %pos.symbol, error = %e, "failed to close position during close-all");
                    results.push(OrderResult {
                        success: false,
                        broker_order_id: None,
                        fill_price: None,
                        fill_size: None,
                        status: "ERROR".to_string(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(results)
    }

    #[instrument(skip(self), name = "binance::cancel_order")]
    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let params = format!("orderId={order_id}");
        let qs = self.signed_query(&params);
        let url = format!("{}/fapi/v1/order?{}", self.base_url, qs);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .context("DELETE /fapi/v1/order request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            anyhow::bail!("binance DELETE /fapi/v1/order returned {}: {}", status, body);
        }

        Ok(())
    }

    #[instrument(skip(self), name = "binance::health_check")]
    async fn health_check(&self) -> Result<HealthStatus> {
        let url = format!("{}/fapi/v1/ping", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(HealthStatus {
                success: true,
                error: None,
            }),
            Ok(resp) => Ok(HealthStatus {
                success: false,
                error: Some(format!("ping returned {}", resp.status())),
            }),
            Err(e) => Ok(HealthStatus {
                success: false,
                error: Some(e.to_string()),
            }),
        }
    }
}

impl std::fmt::Debug for BinanceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceAdapter")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
