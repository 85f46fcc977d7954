use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::Store;
use crate::error::RegistryError;
use crate::indexer::MarketDiscovery;
use crate::token_id;
use crate::types::{MarketStatus, NewMarket};

/// Gamma API client that discovers an event's markets and upserts them into the store.
#[derive(Clone)]
pub struct GammaRegistry {
    client: reqwest::Client,
    base_url: String,
    store: Store,
}

impl GammaRegistry {
    pub fn new(cfg: &Config, store: Store) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.gamma_api_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    /// Raw market objects of every event matching `slug`.
    pub async fn fetch_event_markets(&self, slug: &str) -> Result<Vec<serde_json::Value>, RegistryError> {
        let url = format!("{}/events", self.base_url);
        info!("Fetching markets from {url}?slug={slug}");

        let resp: serde_json::Value = self
            .client
            .get(&url)
            .query(&[("slug", slug)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let events = resp.as_array().ok_or_else(|| {
            RegistryError::Permanent("GAMMA /events response was not an array".to_string())
        })?;
        if events.is_empty() {
            warn!("No event found for slug: {slug}");
        }
        Ok(collect_markets(events))
    }
}

impl MarketDiscovery for GammaRegistry {
    async fn refresh(&self, slug: &str) -> Result<usize, RegistryError> {
        let raw = self.fetch_event_markets(slug).await?;
        let mut stored = 0usize;

        for item in &raw {
            let Some(market) = parse_gamma_market(item) else {
                continue;
            };
            self.store
                .upsert_market(&market)
                .await
                .map_err(|e| RegistryError::Permanent(format!("storing market {}: {e}", market.slug)))?;
            debug!(slug = %market.slug, condition_id = %market.condition_id, "Stored market");
            stored += 1;
        }

        info!(slug, fetched = raw.len(), stored, "Finished discovery");
        Ok(stored)
    }
}

fn collect_markets(events: &[serde_json::Value]) -> Vec<serde_json::Value> {
    events
        .iter()
        .filter_map(|e| e.get("markets").and_then(|m| m.as_array()))
        .flatten()
        .cloned()
        .collect()
}

/// Gamma encodes some list fields as JSON inside a string.
fn string_list(v: &serde_json::Value, key: &str) -> Option<Vec<String>> {
    match v.get(key)? {
        serde_json::Value::String(s) => serde_json::from_str(s).ok(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|i| i.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

fn flag(v: &serde_json::Value, key: &str) -> bool {
    v.get(key).and_then(|b| b.as_bool()).unwrap_or(false)
}

/// Parse one Gamma market into a storable binary market.
///
/// Returns None when the market cannot be mapped to a YES/NO token pair.
pub fn parse_gamma_market(v: &serde_json::Value) -> Option<NewMarket> {
    let slug = v.get("slug").and_then(|s| s.as_str()).unwrap_or("").to_string();

    let Some(condition_id) = v.get("conditionId").and_then(|s| s.as_str()) else {
        warn!("Market {slug} has no conditionId");
        return None;
    };

    let question_id = v
        .get("questionID")
        .or_else(|| v.get("questionId"))
        .and_then(|q| q.as_str())
        .map(|q| q.to_lowercase());

    let Some(raw_token_ids) = string_list(v, "clobTokenIds") else {
        warn!("Market {slug} has unparseable clobTokenIds");
        return None;
    };
    let Some(token_ids) = raw_token_ids
        .iter()
        .map(|t| token_id::normalize(t))
        .collect::<Option<Vec<_>>>()
    else {
        warn!("Market {slug} has non-numeric token ids: {raw_token_ids:?}");
        return None;
    };
    let outcomes = string_list(v, "outcomes").unwrap_or_default();

    if token_ids.is_empty() || token_ids.len() != outcomes.len() {
        warn!(
            "Market {slug} has mismatched tokens/outcomes. Tokens: {}, Outcomes: {}",
            token_ids.len(),
            outcomes.len()
        );
        return None;
    }

    let yes_idx = outcomes.iter().position(|o| o.eq_ignore_ascii_case("Yes"));
    let no_idx = outcomes.iter().position(|o| o.eq_ignore_ascii_case("No"));
    let (Some(yes_idx), Some(no_idx)) = (yes_idx, no_idx) else {
        warn!("Market {slug} missing YES/NO outcomes: {outcomes:?}");
        return None;
    };
    if token_ids[yes_idx] == token_ids[no_idx] {
        warn!("Market {slug} uses the same token for YES and NO: {}", token_ids[yes_idx]);
        return None;
    }

    let status = if flag(v, "resolved") {
        MarketStatus::Resolved
    } else if flag(v, "closed") || !flag(v, "active") {
        MarketStatus::Closed
    } else {
        MarketStatus::Active
    };

    Some(NewMarket {
        slug,
        condition_id: condition_id.to_lowercase(),
        question_id,
        yes_token_id: token_ids[yes_idx].clone(),
        no_token_id: token_ids[no_idx].clone(),
        status,
    })
}
