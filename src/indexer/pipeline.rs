use alloy::primitives::{hex, B256};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::chain::ChainClient;
use crate::db::Store;
use crate::error::Result;
use crate::indexer::decoder::{decode_fill, Rejection};
use crate::indexer::normalizer::normalize;
use crate::indexer::resolver::{MarketDiscovery, MarketResolver, Resolution};
use crate::indexer::timestamps::BlockTimestamps;
use crate::types::{RawLog, Trade};

/// Per-run counters, one bucket per terminal state of a log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub logs: usize,
    pub undecodable: usize,
    pub self_fills: usize,
    pub unresolved: usize,
    pub trades: usize,
    /// Rows actually new to the store; lower than `trades` when a range is replayed.
    pub inserted: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub from_block: u64,
    pub to_block: u64,
    pub trades: Vec<Trade>,
    pub stats: RunStats,
}

/// Turns `OrderFilled` logs over a block range into persisted trades.
///
/// Logs are processed one at a time in (block, log index) order. Per-log
/// problems drop that log only; fetch and storage failures abort the range
/// and leave the checkpoint where it was.
pub struct Indexer<C, D> {
    chain: C,
    store: Store,
    resolver: MarketResolver<D>,
    timestamps: BlockTimestamps,
}

impl<C: ChainClient, D: MarketDiscovery> Indexer<C, D> {
    pub fn new(chain: C, store: Store, discovery: D) -> Self {
        Self {
            chain,
            resolver: MarketResolver::new(store.clone(), discovery),
            store,
            timestamps: BlockTimestamps::new(),
        }
    }

    /// Index `[from_block, to_block]` and advance the checkpoint to `to_block`
    /// once the resulting batch is durable.
    pub async fn run_range(
        &mut self,
        from_block: u64,
        to_block: u64,
        event_slug: Option<&str>,
    ) -> Result<RunReport> {
        info!(from_block, to_block, event_slug, "Indexing trades");
        self.resolver.begin_run();

        let logs = self.chain.get_logs(from_block, to_block).await?;
        let mut stats = RunStats {
            logs: logs.len(),
            ..RunStats::default()
        };

        let mut trades = Vec::new();
        for log in &logs {
            if let Some(trade) = self.process_log(log, event_slug, &mut stats).await? {
                trades.push(trade);
            }
        }
        stats.trades = trades.len();

        if !trades.is_empty() {
            stats.inserted = self.store.insert_batch(&trades).await?;
            self.store.advance_checkpoint(to_block).await?;
        }

        info!(
            from_block,
            to_block,
            logs = stats.logs,
            trades = stats.trades,
            inserted = stats.inserted,
            undecodable = stats.undecodable,
            self_fills = stats.self_fills,
            unresolved = stats.unresolved,
            cached_blocks = self.timestamps.len(),
            "Range indexed",
        );
        Ok(RunReport {
            from_block,
            to_block,
            trades,
            stats,
        })
    }

    /// Index the block containing `tx_hash` and keep only that transaction's trades.
    pub async fn index_transaction(
        &mut self,
        tx_hash: B256,
        event_slug: Option<&str>,
    ) -> Result<RunReport> {
        let block_number = self.chain.get_transaction_block(tx_hash).await?;
        let mut report = self.run_range(block_number, block_number, event_slug).await?;

        let wanted = hex::encode_prefixed(tx_hash);
        report.trades.retain(|t| t.tx_hash.eq_ignore_ascii_case(&wanted));
        info!(tx_hash = %wanted, block_number, trades = report.trades.len(), "Transaction indexed");
        Ok(report)
    }

    /// RawLog → Decoded → Normalized → Resolved, or `None` when the log is dropped.
    async fn process_log(
        &mut self,
        log: &RawLog,
        event_slug: Option<&str>,
        stats: &mut RunStats,
    ) -> Result<Option<Trade>> {
        let fill = match decode_fill(log) {
            Ok(fill) => fill,
            Err(Rejection::Undecodable(reason)) => {
                stats.undecodable += 1;
                debug!(tx_hash = %log.tx_hash, log_index = log.log_index, "Skipping undecodable log: {reason}");
                return Ok(None);
            }
            Err(Rejection::SelfFill) => {
                stats.self_fills += 1;
                trace!(tx_hash = %log.tx_hash, log_index = log.log_index, "Skipping exchange self-fill");
                return Ok(None);
            }
        };

        let normalized = normalize(&fill);
        trace!(
            order_hash = %fill.order_hash,
            exchange = %fill.exchange,
            fee = %fill.fee,
            side = %normalized.side,
            token_id = %normalized.token_id,
            "decoded fill"
        );

        let (market_id, outcome) = match self.resolver.resolve(&normalized.token_id, event_slug).await? {
            Resolution::Resolved { market_id, outcome } => (market_id, outcome),
            Resolution::Unresolved => {
                stats.unresolved += 1;
                warn!(
                    token_id = %normalized.token_id,
                    tx_hash = %fill.tx_hash,
                    log_index = fill.log_index,
                    "Market not found for token even after discovery attempt. Skipping trade."
                );
                return Ok(None);
            }
        };

        let timestamp = self.timestamps.get(&self.chain, fill.block_number).await;

        Ok(Some(Trade {
            tx_hash: hex::encode_prefixed(fill.tx_hash),
            log_index: fill.log_index,
            market_id,
            maker: hex::encode_prefixed(fill.maker),
            taker: hex::encode_prefixed(fill.taker),
            side: normalized.side,
            outcome,
            price: normalized.price,
            size: normalized.size,
            timestamp,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use alloy::primitives::{Bytes, U256};

    use super::*;
    use crate::db::store::tests::market;
    use crate::error::{AppError, ChainError};
    use crate::indexer::decoder::tests::{fill_log, EXCHANGE, TAKER};
    use crate::indexer::resolver::tests::FakeDiscovery;
    use crate::token_id;
    use crate::types::{Outcome, Side};

    #[derive(Default)]
    pub(crate) struct FakeChain {
        logs: Vec<RawLog>,
        timestamps: HashMap<u64, u64>,
        receipts: HashMap<B256, u64>,
        fail_logs: bool,
        block_calls: Arc<AtomicUsize>,
    }

    impl FakeChain {
        pub(crate) fn with_logs(mut self, logs: Vec<RawLog>) -> Self {
            self.logs = logs;
            self
        }

        pub(crate) fn with_timestamp(mut self, block: u64, ts: u64) -> Self {
            self.timestamps.insert(block, ts);
            self
        }

        pub(crate) fn with_receipt(mut self, tx_hash: B256, block: u64) -> Self {
            self.receipts.insert(tx_hash, block);
            self
        }

        pub(crate) fn unreachable(mut self) -> Self {
            self.fail_logs = true;
            self
        }

        pub(crate) fn block_calls(&self) -> usize {
            self.block_calls.load(Ordering::SeqCst)
        }
    }

    impl ChainClient for FakeChain {
        async fn get_logs(&self, from_block: u64, to_block: u64) -> std::result::Result<Vec<RawLog>, ChainError> {
            if self.fail_logs {
                return Err(ChainError::Transient("connection refused".to_string()));
            }
            Ok(self
                .logs
                .iter()
                .filter(|l| (from_block..=to_block).contains(&l.block_number))
                .cloned()
                .collect())
        }

        async fn get_block_timestamp(&self, block_number: u64) -> std::result::Result<u64, ChainError> {
            self.block_calls.fetch_add(1, Ordering::SeqCst);
            self.timestamps
                .get(&block_number)
                .copied()
                .ok_or_else(|| ChainError::Transient(format!("block {block_number} timed out")))
        }

        async fn get_transaction_block(&self, tx_hash: B256) -> std::result::Result<u64, ChainError> {
            self.receipts
                .get(&tx_hash)
                .copied()
                .ok_or_else(|| ChainError::ReceiptNotFound(tx_hash.to_string()))
        }
    }

    const YES: u64 = 1001;
    const NO: u64 = 1002;
    const UNKNOWN: u64 = 4242;

    fn tok(id: u64) -> String {
        token_id::encode(&U256::from(id))
    }

    async fn store_with_market() -> (Store, i64) {
        let store = Store::in_memory().await.unwrap();
        let id = store
            .upsert_market(&market("event-market", "0xc0", &tok(YES), &tok(NO)))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn range_produces_trades_and_advances_checkpoint() {
        let (store, market_id) = store_with_market().await;
        let mut garbage = fill_log(150, 9, TAKER, 0, YES, 1, 1);
        garbage.data = Bytes::from_static(&[0u8; 12]);
        let chain = FakeChain::default()
            .with_timestamp(100, 1_700_000_000)
            .with_timestamp(150, 1_700_000_300)
            .with_logs(vec![
                // maker pays 0.5M collateral for 1M YES tokens
                fill_log(100, 0, TAKER, 0, YES, 500_000, 1_000_000),
                // maker sells 2M NO tokens for 1M collateral
                fill_log(100, 1, TAKER, NO, 0, 2_000_000, 1_000_000),
                fill_log(150, 0, EXCHANGE, 0, YES, 500_000, 1_000_000),
                garbage,
            ]);
        let discovery = FakeDiscovery::new(store.clone(), "event", Vec::new());
        let mut indexer = Indexer::new(chain, store.clone(), discovery);

        let report = indexer.run_range(100, 200, None).await.unwrap();

        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.stats.self_fills, 1);
        assert_eq!(report.stats.undecodable, 1);
        assert_eq!(report.stats.inserted, 2);

        let buy = &report.trades[0];
        assert_eq!(buy.side, Side::Buy);
        assert_eq!(buy.outcome, Outcome::Yes);
        assert_eq!(buy.market_id, market_id);
        assert!((buy.price - 0.5).abs() < 1e-12);
        assert_eq!(buy.size, 1_000_000.0);
        assert_eq!(buy.timestamp, 1_700_000_000);
        assert_eq!(buy.maker, "0x1111111111111111111111111111111111111111");
        assert_eq!(buy.tx_hash, hex::encode_prefixed(B256::with_last_byte(100)));

        let sell = &report.trades[1];
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(sell.outcome, Outcome::No);
        assert!((sell.price - 0.5).abs() < 1e-12);
        assert_eq!(sell.size, 2_000_000.0);

        assert_eq!(store.trade_count().await.unwrap(), 2);
        assert_eq!(store.read_checkpoint().await.unwrap(), 200);
    }

    #[tokio::test]
    async fn replaying_a_range_adds_no_rows() {
        let (store, _) = store_with_market().await;
        let chain = FakeChain::default().with_logs(vec![
            fill_log(100, 0, TAKER, 0, YES, 500_000, 1_000_000),
            fill_log(101, 0, TAKER, 0, NO, 400_000, 1_000_000),
        ]);
        let discovery = FakeDiscovery::new(store.clone(), "event", Vec::new());
        let mut indexer = Indexer::new(chain, store.clone(), discovery);

        indexer.run_range(100, 101, None).await.unwrap();
        let replay = indexer.run_range(100, 101, None).await.unwrap();

        assert_eq!(replay.trades.len(), 2);
        assert_eq!(replay.stats.inserted, 0);
        assert_eq!(store.trade_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_token_discovered_mid_run() {
        let store = Store::in_memory().await.unwrap();
        let chain = FakeChain::default().with_logs(vec![fill_log(100, 0, TAKER, NO, 0, 2_000_000, 900_000)]);
        let discovery = FakeDiscovery::new(
            store.clone(),
            "event",
            vec![market("event-market", "0xc0", &tok(YES), &tok(NO))],
        );
        let mut indexer = Indexer::new(chain, store.clone(), discovery.clone());

        let report = indexer.run_range(100, 100, Some("event")).await.unwrap();

        assert_eq!(discovery.calls(), 1);
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].outcome, Outcome::No);
        let stored = store.market_by_slug("event-market").await.unwrap().expect("discovered");
        assert_eq!(report.trades[0].market_id, stored.id);
    }

    #[tokio::test]
    async fn unresolved_trade_dropped_others_persist() {
        let (store, _) = store_with_market().await;
        let chain = FakeChain::default().with_logs(vec![
            fill_log(100, 0, TAKER, 0, UNKNOWN, 500_000, 1_000_000),
            fill_log(100, 1, TAKER, 0, YES, 500_000, 1_000_000),
            fill_log(100, 2, TAKER, UNKNOWN, 0, 1_000_000, 500_000),
        ]);
        let discovery = FakeDiscovery::new(store.clone(), "event", Vec::new());
        let mut indexer = Indexer::new(chain, store.clone(), discovery.clone());

        let report = indexer.run_range(100, 100, Some("event")).await.unwrap();

        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.stats.unresolved, 2);
        // same unknown token twice, one discovery attempt
        assert_eq!(discovery.calls(), 1);
        assert_eq!(store.trade_count().await.unwrap(), 1);
        assert_eq!(store.read_checkpoint().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn storage_failure_keeps_checkpoint() {
        let (store, _) = store_with_market().await;
        store.advance_checkpoint(50).await.unwrap();
        sqlx::query("DROP TABLE trades").execute(store.pool()).await.unwrap();

        let chain = FakeChain::default().with_logs(vec![fill_log(100, 0, TAKER, 0, YES, 500_000, 1_000_000)]);
        let discovery = FakeDiscovery::new(store.clone(), "event", Vec::new());
        let mut indexer = Indexer::new(chain, store.clone(), discovery);

        let err = indexer.run_range(100, 200, None).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(store.read_checkpoint().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_range() {
        let (store, _) = store_with_market().await;
        store.advance_checkpoint(50).await.unwrap();
        let discovery = FakeDiscovery::new(store.clone(), "event", Vec::new());
        let mut indexer = Indexer::new(FakeChain::default().unreachable(), store.clone(), discovery);

        let err = indexer.run_range(100, 200, None).await.unwrap_err();
        assert!(matches!(err, AppError::Chain(ref e) if e.is_retryable()));
        assert_eq!(store.trade_count().await.unwrap(), 0);
        assert_eq!(store.read_checkpoint().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn empty_range_leaves_checkpoint() {
        let (store, _) = store_with_market().await;
        let discovery = FakeDiscovery::new(store.clone(), "event", Vec::new());
        let mut indexer = Indexer::new(FakeChain::default(), store.clone(), discovery);

        let report = indexer.run_range(100, 200, None).await.unwrap();
        assert!(report.trades.is_empty());
        assert_eq!(store.read_checkpoint().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn timestamp_failure_still_persists_trade() {
        let (store, _) = store_with_market().await;
        let chain = FakeChain::default().with_logs(vec![fill_log(100, 0, TAKER, 0, YES, 500_000, 1_000_000)]);
        let discovery = FakeDiscovery::new(store.clone(), "event", Vec::new());
        let mut indexer = Indexer::new(chain, store.clone(), discovery);

        let report = indexer.run_range(100, 100, None).await.unwrap();
        assert_eq!(report.trades[0].timestamp, 0);
        assert_eq!(store.trade_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn single_transaction_filters_block_trades() {
        let (store, _) = store_with_market().await;
        let wanted = B256::repeat_byte(0x77);
        let mut ours = fill_log(300, 0, TAKER, 0, YES, 500_000, 1_000_000);
        ours.tx_hash = wanted;
        let neighbour = fill_log(300, 1, TAKER, 0, NO, 500_000, 1_000_000);
        let chain = FakeChain::default()
            .with_logs(vec![ours, neighbour])
            .with_receipt(wanted, 300)
            .with_timestamp(300, 1_700_000_900);
        let discovery = FakeDiscovery::new(store.clone(), "event", Vec::new());
        let mut indexer = Indexer::new(chain, store.clone(), discovery);

        let report = indexer.index_transaction(wanted, None).await.unwrap();
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].tx_hash, hex::encode_prefixed(wanted));
        // the whole block is still persisted
        assert_eq!(store.trade_count().await.unwrap(), 2);

        let missing = indexer.index_transaction(B256::repeat_byte(0x01), None).await;
        assert!(matches!(missing, Err(AppError::Chain(ChainError::ReceiptNotFound(_)))));
    }
}
