use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::db::models::{MarketRow, TradeRow};
use crate::error::Result;
use crate::types::{NewMarket, Trade};

const CHECKPOINT_KEY: &str = "last_block";

/// SQLite-backed store for markets, trades and the sync checkpoint.
///
/// WAL journaling lets the read API query while an ingestion transaction is open.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(db_path: &str) -> Result<Self> {
        if let Some(dir) = Path::new(db_path).parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self::migrated(pool).await?;
        info!("Database ready at {db_path}");
        Ok(store)
    }

    /// Private in-memory database on a single pinned connection.
    #[cfg(test)]
    pub(crate) async fn in_memory() -> Result<Self> {
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Markets
    // -----------------------------------------------------------------------

    /// Insert or update keyed on `condition_id`. Returns the market's id.
    pub async fn upsert_market(&self, market: &NewMarket) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO markets (slug, condition_id, question_id, yes_token_id, no_token_id, status)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(condition_id) DO UPDATE SET
                slug = excluded.slug,
                question_id = excluded.question_id,
                yes_token_id = excluded.yes_token_id,
                no_token_id = excluded.no_token_id,
                status = excluded.status
            RETURNING id
            "#,
        )
        .bind(&market.slug)
        .bind(&market.condition_id)
        .bind(&market.question_id)
        .bind(&market.yes_token_id)
        .bind(&market.no_token_id)
        .bind(market.status.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Market whose YES or NO token is `token_id` (canonical encoding).
    ///
    /// A token belongs to one market. If several rows claim it, the oldest wins.
    pub async fn market_by_token_id(&self, token_id: &str) -> Result<Option<MarketRow>> {
        let rows = sqlx::query_as::<_, MarketRow>(
            r#"
            SELECT id, slug, condition_id, question_id, yes_token_id, no_token_id, status
            FROM markets
            WHERE yes_token_id = ? OR no_token_id = ?
            ORDER BY id
            "#,
        )
        .bind(token_id)
        .bind(token_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() > 1 {
            let ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
            warn!(token_id, market_ids = ?ids, "Token id claimed by several markets, using the oldest");
        }
        Ok(rows.into_iter().next())
    }

    pub async fn market_by_slug(&self, slug: &str) -> Result<Option<MarketRow>> {
        let row = sqlx::query_as::<_, MarketRow>(
            r#"
            SELECT id, slug, condition_id, question_id, yes_token_id, no_token_id, status
            FROM markets
            WHERE slug = ?
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // -----------------------------------------------------------------------
    // Trades
    // -----------------------------------------------------------------------

    /// Persist `trades` in one transaction and return how many rows were new.
    ///
    /// Rows whose `(tx_hash, log_index)` already exist are skipped. Any other
    /// failure rolls the whole batch back.
    pub async fn insert_batch(&self, trades: &[Trade]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for t in trades {
            let result = sqlx::query(
                r#"
                INSERT INTO trades (
                    tx_hash, log_index, market_id, maker, taker,
                    side, outcome, price, size, timestamp
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tx_hash, log_index) DO NOTHING
                "#,
            )
            .bind(&t.tx_hash)
            .bind(t.log_index as i64)
            .bind(t.market_id)
            .bind(&t.maker)
            .bind(&t.taker)
            .bind(t.side.to_string())
            .bind(t.outcome.to_string())
            .bind(t.price)
            .bind(t.size)
            .bind(t.timestamp as i64)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        debug!(batch = trades.len(), inserted, "trade batch committed");
        Ok(inserted)
    }

    /// Page of a market's trades, newest first. `offset` doubles as the API cursor.
    pub async fn trades_for_market(
        &self,
        market_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TradeRow>> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT id, tx_hash, log_index, market_id, maker, taker,
                   side, outcome, price, size, timestamp
            FROM trades
            WHERE market_id = ?
            ORDER BY timestamp DESC, log_index DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(market_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn trade_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Checkpoint
    // -----------------------------------------------------------------------

    /// Record `block_number` as fully processed. Never moves the checkpoint backwards.
    pub async fn advance_checkpoint(&self, block_number: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)
            "#,
        )
        .bind(CHECKPOINT_KEY)
        .bind(block_number as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Last fully processed block, 0 on a fresh database.
    pub async fn read_checkpoint(&self) -> Result<u64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
            .bind(CHECKPOINT_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.unwrap_or(0).max(0) as u64)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{MarketStatus, Outcome, Side};

    pub(crate) fn market(slug: &str, condition_id: &str, yes: &str, no: &str) -> NewMarket {
        NewMarket {
            slug: slug.to_string(),
            condition_id: condition_id.to_string(),
            question_id: Some("0xq".to_string()),
            yes_token_id: yes.to_string(),
            no_token_id: no.to_string(),
            status: MarketStatus::Active,
        }
    }

    pub(crate) fn trade(tx_hash: &str, log_index: u64, market_id: i64, timestamp: u64) -> Trade {
        Trade {
            tx_hash: tx_hash.to_string(),
            log_index,
            market_id,
            maker: "0xmaker".to_string(),
            taker: "0xtaker".to_string(),
            side: Side::Buy,
            outcome: Outcome::Yes,
            price: 0.5,
            size: 100.0,
            timestamp,
        }
    }

    #[tokio::test]
    async fn upsert_market_updates_in_place() {
        let store = Store::in_memory().await.unwrap();
        let mut m = market("test-market", "0x123", "0x1", "0x2");
        let id = store.upsert_market(&m).await.unwrap();

        m.status = MarketStatus::Resolved;
        m.slug = "renamed".to_string();
        let again = store.upsert_market(&m).await.unwrap();
        assert_eq!(id, again);

        let row = store.market_by_slug("renamed").await.unwrap().expect("market");
        assert_eq!(row.status, "RESOLVED");
        assert_eq!(row.condition_id, "0x123");
        assert!(store.market_by_slug("test-market").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn market_found_by_either_token() {
        let store = Store::in_memory().await.unwrap();
        store.upsert_market(&market("m", "0xc", "0x1", "0x2")).await.unwrap();

        let yes = store.market_by_token_id("0x1").await.unwrap().expect("yes side");
        let no = store.market_by_token_id("0x2").await.unwrap().expect("no side");
        assert_eq!(yes.id, no.id);
        assert_eq!(yes.outcome_of("0x1"), Some(Outcome::Yes));
        assert_eq!(no.outcome_of("0x2"), Some(Outcome::No));
        assert!(store.market_by_token_id("0x3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shared_token_resolves_to_oldest_market() {
        let store = Store::in_memory().await.unwrap();
        let first = store.upsert_market(&market("a", "0xc1", "0x1", "0x2")).await.unwrap();
        let second = store.upsert_market(&market("b", "0xc2", "0x3", "0x1")).await.unwrap();
        assert_ne!(first, second);

        let row = store.market_by_token_id("0x1").await.unwrap().expect("market");
        assert_eq!(row.id, first);
        assert_eq!(row.outcome_of("0x1"), Some(Outcome::Yes));
    }

    #[tokio::test]
    async fn insert_batch_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        let id = store.upsert_market(&market("m", "0xc", "0x1", "0x2")).await.unwrap();
        let batch = vec![trade("0xtx1", 1, id, 1000), trade("0xtx1", 2, id, 1000)];

        assert_eq!(store.insert_batch(&batch).await.unwrap(), 2);
        assert_eq!(store.trade_count().await.unwrap(), 2);

        assert_eq!(store.insert_batch(&batch).await.unwrap(), 0);
        assert_eq!(store.trade_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_inside_one_batch_is_ignored() {
        let store = Store::in_memory().await.unwrap();
        let id = store.upsert_market(&market("m", "0xc", "0x1", "0x2")).await.unwrap();
        let batch = vec![trade("0xtx1", 1, id, 1000), trade("0xtx1", 1, id, 1000)];
        assert_eq!(store.insert_batch(&batch).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failing_row_rolls_back_whole_batch() {
        let store = Store::in_memory().await.unwrap();
        let id = store.upsert_market(&market("m", "0xc", "0x1", "0x2")).await.unwrap();
        // market 999 does not exist: foreign key violation, not a uniqueness conflict
        let batch = vec![trade("0xtx1", 1, id, 1000), trade("0xtx2", 1, 999, 1000)];

        assert!(store.insert_batch(&batch).await.is_err());
        assert_eq!(store.trade_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn checkpoint_defaults_and_never_regresses() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(store.read_checkpoint().await.unwrap(), 0);

        store.advance_checkpoint(12345).await.unwrap();
        assert_eq!(store.read_checkpoint().await.unwrap(), 12345);

        store.advance_checkpoint(12346).await.unwrap();
        assert_eq!(store.read_checkpoint().await.unwrap(), 12346);

        store.advance_checkpoint(100).await.unwrap();
        assert_eq!(store.read_checkpoint().await.unwrap(), 12346);
    }

    #[tokio::test]
    async fn checkpoint_row_recreated_when_missing() {
        let store = Store::in_memory().await.unwrap();
        sqlx::query("DELETE FROM sync_state").execute(store.pool()).await.unwrap();
        assert_eq!(store.read_checkpoint().await.unwrap(), 0);
        store.advance_checkpoint(42).await.unwrap();
        assert_eq!(store.read_checkpoint().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn trades_page_newest_first() {
        let store = Store::in_memory().await.unwrap();
        let id = store.upsert_market(&market("m", "0xc", "0x1", "0x2")).await.unwrap();
        let other = store.upsert_market(&market("o", "0xd", "0x3", "0x4")).await.unwrap();
        store
            .insert_batch(&[
                trade("0xa", 0, id, 100),
                trade("0xb", 0, id, 300),
                trade("0xb", 1, id, 300),
                trade("0xc", 0, id, 200),
                trade("0xd", 0, other, 400),
            ])
            .await
            .unwrap();

        let first = store.trades_for_market(id, 2, 0).await.unwrap();
        let keys: Vec<_> = first.iter().map(|t| (t.tx_hash.as_str(), t.log_index)).collect();
        assert_eq!(keys, vec![("0xb", 1), ("0xb", 0)]);

        let rest = store.trades_for_market(id, 10, 2).await.unwrap();
        let keys: Vec<_> = rest.iter().map(|t| t.tx_hash.as_str()).collect();
        assert_eq!(keys, vec!["0xc", "0xa"]);
        assert!(rest.iter().all(|t| t.side == "BUY" && t.outcome == "YES"));
    }
}
