use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// A market as produced by the registry, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMarket {
    pub slug: String,
    /// Lowercase hex.
    pub condition_id: String,
    pub question_id: Option<String>,
    /// Canonical token ids, see [`crate::token_id`].
    pub yes_token_id: String,
    pub no_token_id: String,
    pub status: MarketStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Active,
    Closed,
    Resolved,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketStatus::Active => "ACTIVE",
            MarketStatus::Closed => "CLOSED",
            MarketStatus::Resolved => "RESOLVED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Trade semantics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Yes => write!(f, "YES"),
            Outcome::No => write!(f, "NO"),
        }
    }
}

/// A fully reconciled trade, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Lowercase 0x-prefixed hex.
    pub tx_hash: String,
    pub log_index: u64,
    pub market_id: i64,
    pub maker: String,
    pub taker: String,
    pub side: Side,
    pub outcome: Outcome,
    pub price: f64,
    /// Raw outcome-token units.
    pub size: f64,
    /// Unix seconds; 0 when the block timestamp could not be fetched.
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// Chain-side inputs
// ---------------------------------------------------------------------------

/// One log as returned by `eth_getLogs`, already stripped of RPC envelope noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting contract.
    pub address: Address,
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// A decoded `OrderFilled` event together with its log position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillEvent {
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub exchange: Address,
    pub order_hash: B256,
    pub maker: Address,
    pub taker: Address,
    pub maker_asset_id: U256,
    pub taker_asset_id: U256,
    pub maker_amount_filled: U256,
    pub taker_amount_filled: U256,
    pub fee: U256,
}

/// Side/price/size/token derived from a fill, before market resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFill {
    pub side: Side,
    pub price: f64,
    pub size: f64,
    /// Canonical token id, see [`crate::token_id`].
    pub token_id: String,
}
