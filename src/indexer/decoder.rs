use alloy::primitives::LogData;
use alloy::sol_types::SolEvent;

use crate::chain::abi::OrderFilled;
use crate::types::{FillEvent, RawLog};

/// Why a log produced no fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Topics or data do not match the `OrderFilled` layout.
    Undecodable(String),
    /// The exchange filling against itself while wrapping a match.
    SelfFill,
}

/// Decode one `OrderFilled` log.
///
/// Topic pre-filtering narrows the input but does not guarantee the layout,
/// so every mismatch is reported as [`Rejection::Undecodable`] rather than an error.
pub fn decode_fill(log: &RawLog) -> Result<FillEvent, Rejection> {
    if log.topics.first() != Some(&OrderFilled::SIGNATURE_HASH) {
        return Err(Rejection::Undecodable("foreign event signature".to_string()));
    }
    let data = LogData::new(log.topics.clone(), log.data.clone())
        .ok_or_else(|| Rejection::Undecodable(format!("{} topics", log.topics.len())))?;
    let event = OrderFilled::decode_log_data(&data)
        .map_err(|e| Rejection::Undecodable(e.to_string()))?;

    if event.taker == log.address {
        return Err(Rejection::SelfFill);
    }

    Ok(FillEvent {
        tx_hash: log.tx_hash,
        log_index: log.log_index,
        block_number: log.block_number,
        exchange: log.address,
        order_hash: event.orderHash,
        maker: event.maker,
        taker: event.taker,
        maker_asset_id: event.makerAssetId,
        taker_asset_id: event.takerAssetId,
        maker_amount_filled: event.makerAmountFilled,
        taker_amount_filled: event.takerAmountFilled,
        fee: event.fee,
    })
}
