use alloy::primitives::U256;

use crate::token_id;
use crate::types::{FillEvent, NormalizedFill, Side};

/// Derive trade semantics from a fill.
///
/// Asset id 0 is collateral. A maker paying collateral is buying outcome
/// tokens; a maker paying tokens is selling them. Price is always collateral
/// per token and size is always the token leg, in raw units.
pub fn normalize(fill: &FillEvent) -> NormalizedFill {
    if fill.maker_asset_id.is_zero() {
        NormalizedFill {
            side: Side::Buy,
            price: ratio(&fill.maker_amount_filled, &fill.taker_amount_filled),
            size: f64::from(fill.taker_amount_filled),
            token_id: token_id::encode(&fill.taker_asset_id),
        }
    } else {
        NormalizedFill {
            side: Side::Sell,
            price: ratio(&fill.taker_amount_filled, &fill.maker_amount_filled),
            size: f64::from(fill.maker_amount_filled),
            token_id: token_id::encode(&fill.maker_asset_id),
        }
    }
}

/// `0.0` on a zero divisor; degenerate fills still produce a trade.
/// Amounts above 2^53 are rounded to the nearest `f64`.
fn ratio(numerator: &U256, divisor: &U256) -> f64 {
    if divisor.is_zero() {
        return 0.0;
    }
    f64::from(*numerator) / f64::from(*divisor)
}
