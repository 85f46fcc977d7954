use std::collections::HashMap;

use tracing::error;

use crate::chain::ChainClient;

/// Memoized block → unix timestamp lookup.
///
/// Owned by one [`crate::indexer::Indexer`]; entries live as long as it does and
/// are never evicted. Failures are not cached, so the next reference retries.
#[derive(Debug, Default)]
pub struct BlockTimestamps {
    cache: HashMap<u64, u64>,
}

impl BlockTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of `block_number`, or 0 if the node could not supply it.
    pub async fn get<C: ChainClient>(&mut self, chain: &C, block_number: u64) -> u64 {
        if let Some(&ts) = self.cache.get(&block_number) {
            return ts;
        }
        match chain.get_block_timestamp(block_number).await {
            Ok(ts) => {
                self.cache.insert(block_number, ts);
                ts
            }
            Err(e) => {
                error!(block_number, retryable = e.is_retryable(), "Failed to get block timestamp: {e}");
                0
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }
}
