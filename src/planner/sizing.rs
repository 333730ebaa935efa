// =============================================================================
// Kelly-fraction position sizing (§4.2 step 4)
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Floor below which a position is not worth opening.
pub const MIN_POSITION_USD: Decimal = dec!(10);

/// `size = equity * risk_pct * (confidence/100 * 0.25) / leverage`, clamped
/// below by `MIN_POSITION_USD` and above by `equity * max_position_pct`.
///
/// The ratio arithmetic (risk_pct, confidence, leverage are all statistical
/// inputs, not ledger money) is done in `f64`; only the final USD amount
/// crosses back into `Decimal`, at the money/ratio boundary documented for
/// this crate's data model.
pub fn kelly_size_usd(
    equity: Decimal,
    risk_pct: f64,
    confidence: f64,
    leverage: f64,
    max_position_pct: f64,
) -> Decimal {
    let equity_f64 = equity.to_f64().unwrap_or(0.0);
    let kelly_fraction = (confidence / 100.0) * 0.25;
    let raw = equity_f64 * risk_pct * kelly_fraction / leverage.max(1.0);
    let ceiling = equity_f64 * max_position_pct;

    let clamped = raw.max(MIN_POSITION_USD.to_f64().unwrap_or(10.0)).min(ceiling.max(10.0));
    Decimal::from_f64_retain(clamped).unwrap_or(MIN_POSITION_USD)
}
