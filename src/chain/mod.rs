pub mod abi;

use std::future::Future;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::{RpcError, TransportError};
use tracing::{debug, warn};

use crate::error::ChainError;
use crate::types::RawLog;

use self::abi::OrderFilled;

/// The slice of the chain RPC surface the indexer needs.
pub trait ChainClient {
    /// `OrderFilled` logs in `[from_block, to_block]`, ascending by (block, log index).
    fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<RawLog>, ChainError>> + Send;

    fn get_block_timestamp(
        &self,
        block_number: u64,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Block that included `tx_hash`.
    fn get_transaction_block(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;
}

impl From<TransportError> for ChainError {
    fn from(e: TransportError) -> Self {
        match e {
            RpcError::Transport(_) | RpcError::NullResp => ChainError::Transient(e.to_string()),
            _ => ChainError::Permanent(e.to_string()),
        }
    }
}

/// [`ChainClient`] over a JSON-RPC HTTP endpoint.
///
/// Retry and timeout policy is whatever the underlying transport is configured with.
#[derive(Clone)]
pub struct RpcChain {
    provider: DynProvider,
    exchanges: Vec<Address>,
}

impl RpcChain {
    /// `exchanges` narrows `eth_getLogs` to those emitters; empty means any address.
    pub async fn connect(rpc_url: &str, exchanges: &[String]) -> Result<Self, ChainError> {
        let exchanges = exchanges
            .iter()
            .map(|a| {
                a.parse::<Address>()
                    .map_err(|e| ChainError::Permanent(format!("invalid exchange address {a}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let provider = DynProvider::new(ProviderBuilder::new().connect(rpc_url).await?);
        Ok(Self { provider, exchanges })
    }
}

impl ChainClient for RpcChain {
    async fn get_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RawLog>, ChainError> {
        let mut filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .event_signature(OrderFilled::SIGNATURE_HASH);
        if !self.exchanges.is_empty() {
            filter = filter.address(self.exchanges.clone());
        }

        let logs = self.provider.get_logs(&filter).await?;
        let total = logs.len();
        let mut raw: Vec<RawLog> = logs.into_iter().filter_map(into_raw_log).collect();
        if raw.len() < total {
            warn!(dropped = total - raw.len(), "logs without position metadata ignored");
        }
        raw.sort_by_key(|l| (l.block_number, l.log_index));
        debug!(from_block, to_block, logs = raw.len(), "fetched logs");
        Ok(raw)
    }

    async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await?
            .ok_or_else(|| ChainError::Transient(format!("block {block_number} not available")))?;
        Ok(block.header.timestamp)
    }

    async fn get_transaction_block(&self, tx_hash: B256) -> Result<u64, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or_else(|| ChainError::ReceiptNotFound(tx_hash.to_string()))?;
        receipt
            .block_number
            .ok_or_else(|| ChainError::ReceiptNotFound(format!("{tx_hash} is still pending")))
    }
}

/// Pending logs carry no position and cannot be keyed; they are skipped.
fn into_raw_log(log: Log) -> Option<RawLog> {
    Some(RawLog {
        address: log.inner.address,
        tx_hash: log.transaction_hash?,
        log_index: log.log_index?,
        block_number: log.block_number?,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
    })
}
