// =============================================================================
// Venue Adapter contract (C5, §4.5)
// =============================================================================
//
// One trait abstracting over any concrete venue (a primary venue, a
// secondary venue, or the mock used in demo/test). §9: "a single adapter
// trait with static polymorphism per construction site... or a boxed trait
// object if runtime switching is required" — this gateway requires runtime
// switching (§4.5 "Switching adapters at runtime"), so the gateway holds
// `Arc<dyn VenueAdapter>`.
// =============================================================================

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit,
    PostOnly,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Direction,
    pub size_units: Decimal,
    pub order_type: OrderKind,
    pub limit_price: Option<Decimal>,
    pub reduce_only: bool,
    pub post_only: bool,
    pub client_order_id: String,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub success: bool,
    pub broker_order_id: Option<String>,
    pub fill_price: Option<Decimal>,
    pub fill_size: Option<Decimal>,
    pub status: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct AccountInfo {
    pub equity: Decimal,
    pub available_balance: Decimal,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone)]
pub struct VenuePosition {
    pub symbol: String,
    pub side: Direction,
    pub size_units: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub success: bool,
    pub error: Option<String>,
}

/// The abstract adapter contract every venue integration must provide
/// (§4.5). All operations are fallible and are expected to translate
/// network/timeout failures into the `Transient` error kind (§7) — the
/// gateway, not the adapter, owns the retry loop (§4.5.1).
#[async_trait::async_trait]
pub trait VenueAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn send_order(&self, request: OrderRequest) -> anyhow::Result<OrderResult>;
    async fn get_account(&self) -> anyhow::Result<AccountInfo>;
    async fn get_positions(&self) -> anyhow::Result<Vec<VenuePosition>>;
    async fn close_position(&self, symbol: &str) -> anyhow::Result<OrderResult>;
    async fn close_all_positions(&self) -> anyhow::Result<Vec<OrderResult>>;
    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<()>;
    async fn health_check(&self) -> anyhow::Result<HealthStatus>;
}
