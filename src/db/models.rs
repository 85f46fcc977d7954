//! Database row types matching `migrations/`.
//! Used by sqlx for typed queries and served as-is by the read API.

use serde::Serialize;

use crate::types::Outcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MarketRow {
    pub id: i64,
    pub slug: String,
    pub condition_id: String,
    pub question_id: Option<String>,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub status: String,
}

impl MarketRow {
    /// Which side of this market `token_id` is, if either.
    pub fn outcome_of(&self, token_id: &str) -> Option<Outcome> {
        if self.yes_token_id == token_id {
            Some(Outcome::Yes)
        } else if self.no_token_id == token_id {
            Some(Outcome::No)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TradeRow {
    pub id: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub market_id: i64,
    pub maker: String,
    pub taker: String,
    pub side: String,
    pub outcome: String,
    pub price: f64,
    pub size: f64,
    pub timestamp: i64,
}
