use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TRADES_LIMIT;
use crate::db::models::{MarketRow, TradeRow};
use crate::db::Store;
use crate::error::AppError;

/// Upper bound on a single trades page.
const MAX_TRADES_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/markets/:slug", get(get_market))
        .route("/markets/:slug/trades", get(get_market_trades))
        .route("/sync", get(get_sync_state))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TradesQuery {
    pub limit: Option<i64>,
    /// Offset into the newest-first trade list.
    pub cursor: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct SyncResponse {
    pub last_block: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn find_market(store: &Store, slug: &str) -> Result<MarketRow, AppError> {
    store
        .market_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("market {slug}")))
}

async fn get_market(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<Json<MarketRow>, AppError> {
    Ok(Json(find_market(&state.store, &slug).await?))
}

async fn get_market_trades(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
    Query(params): Query<TradesQuery>,
) -> Result<Json<Vec<TradeRow>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_TRADES_LIMIT).clamp(1, MAX_TRADES_LIMIT);
    let cursor = params.cursor.unwrap_or(0).max(0);

    let market = find_market(&state.store, &slug).await?;
    let trades = state.store.trades_for_market(market.id, limit, cursor).await?;
    Ok(Json(trades))
}

async fn get_sync_state(State(state): State<ApiState>) -> Result<Json<SyncResponse>, AppError> {
    let last_block = state.store.read_checkpoint().await?;
    Ok(Json(SyncResponse { last_block }))
}
