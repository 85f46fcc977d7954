use std::collections::HashSet;
use std::future::Future;

use tracing::{debug, info, warn};

use crate::db::Store;
use crate::error::{RegistryError, Result};
use crate::types::Outcome;

/// Registry capability used when a token id is not in the store yet.
pub trait MarketDiscovery {
    /// Fetch and store every market of the event `slug`. Returns how many were stored.
    fn refresh(&self, slug: &str) -> impl Future<Output = std::result::Result<usize, RegistryError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved { market_id: i64, outcome: Outcome },
    Unresolved,
}

/// Maps token ids to (market, outcome) with one discovery attempt per token per run.
pub struct MarketResolver<D> {
    store: Store,
    discovery: D,
    attempted: HashSet<String>,
}

impl<D: MarketDiscovery> MarketResolver<D> {
    pub fn new(store: Store, discovery: D) -> Self {
        Self {
            store,
            discovery,
            attempted: HashSet::new(),
        }
    }

    /// Forget which tokens already had their discovery attempt.
    pub fn begin_run(&mut self) {
        self.attempted.clear();
    }

    /// Resolve a canonical `token_id`.
    ///
    /// On a miss with a `discovery_hint` (event slug), the registry is refreshed
    /// once and the lookup retried once. Only storage failures are errors; a
    /// registry failure leaves the token unresolved.
    pub async fn resolve(&mut self, token_id: &str, discovery_hint: Option<&str>) -> Result<Resolution> {
        if let Some(resolution) = self.lookup(token_id).await? {
            return Ok(resolution);
        }
        let Some(slug) = discovery_hint else {
            return Ok(Resolution::Unresolved);
        };
        if !self.attempted.insert(token_id.to_string()) {
            debug!(token_id, "discovery already attempted this run");
            return Ok(Resolution::Unresolved);
        }

        info!(token_id, slug, "Market not found for token, triggering discovery");
        match self.discovery.refresh(slug).await {
            Ok(stored) => debug!(slug, stored, "discovery finished"),
            Err(e) => warn!(slug, retryable = e.is_retryable(), "Discovery failed: {e}"),
        }

        Ok(self.lookup(token_id).await?.unwrap_or(Resolution::Unresolved))
    }

    async fn lookup(&self, token_id: &str) -> Result<Option<Resolution>> {
        let Some(market) = self.store.market_by_token_id(token_id).await? else {
            return Ok(None);
        };
        Ok(market.outcome_of(token_id).map(|outcome| Resolution::Resolved {
            market_id: market.id,
            outcome,
        }))
    }
}
