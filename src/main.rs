mod api;
mod chain;
mod config;
mod db;
mod error;
mod indexer;
mod registry;
mod token_id;
mod types;

use std::path::{Path, PathBuf};

use alloy::primitives::B256;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::chain::RpcChain;
use crate::config::{Config, SAMPLE_TRADES};
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::indexer::{Indexer, MarketDiscovery};
use crate::registry::GammaRegistry;
use crate::types::Trade;

#[derive(Parser)]
#[command(name = "indexer", about = "Polymarket on-chain trade indexer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index OrderFilled trades for a block range or a single transaction.
    Index(IndexArgs),
    /// Fetch an event's markets from Gamma and store them.
    Discover {
        #[arg(long)]
        event_slug: String,
        /// Path to the SQLite database (defaults to DB_PATH).
        #[arg(long)]
        db: Option<String>,
    },
    /// Serve the read API.
    Serve {
        #[arg(long)]
        db: Option<String>,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Defaults to API_PORT.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(clap::Args)]
struct IndexArgs {
    /// Transaction hash to index.
    #[arg(long, conflicts_with_all = ["from_block", "to_block"])]
    tx_hash: Option<B256>,
    /// Event slug used for market discovery.
    #[arg(long)]
    event_slug: Option<String>,
    /// Delete the database before indexing.
    #[arg(long)]
    reset_db: bool,
    #[arg(long, requires = "to_block")]
    from_block: Option<u64>,
    #[arg(long, requires = "from_block")]
    to_block: Option<u64>,
    /// Write the run summary here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let result = match cli.command {
        Command::Index(args) => run_index(cfg, args).await,
        Command::Discover { event_slug, db } => run_discover(cfg, event_slug, db).await,
        Command::Serve { db, host, port } => run_serve(cfg, db, host, port).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

/// Shape of the JSON written after an indexing run.
#[derive(Serialize)]
struct RunSummary<'a> {
    from_block: u64,
    to_block: u64,
    inserted_trades: usize,
    market_slug: Option<&'a str>,
    market_id: Option<i64>,
    sample_trades: &'a [Trade],
    db_path: &'a str,
}

async fn run_index(cfg: Config, args: IndexArgs) -> Result<()> {
    let db_path = args.db.unwrap_or_else(|| cfg.db_path.clone());
    if args.reset_db {
        reset_db(&db_path).await?;
    }

    let store = Store::open(&db_path).await?;
    let registry = GammaRegistry::new(&cfg, store.clone())?;
    let slug = args.event_slug.as_deref();

    if let Some(slug) = slug {
        prefetch_markets(&registry, slug).await;
    }

    let chain = RpcChain::connect(cfg.require_rpc_url()?, &cfg.exchange_addresses).await?;
    let mut indexer = Indexer::new(chain, store.clone(), registry);

    let report = match (args.tx_hash, args.from_block, args.to_block) {
        (Some(tx_hash), _, _) => {
            info!("Indexing transaction: {tx_hash}");
            indexer.index_transaction(tx_hash, slug).await?
        }
        (None, Some(from), Some(to)) => {
            if from > to {
                return Err(AppError::Config(format!("--from-block {from} is after --to-block {to}")));
            }
            info!("Indexing range: {from} - {to}");
            indexer.run_range(from, to, slug).await?
        }
        _ => {
            warn!("No action specified. Use --tx-hash or --from-block/--to-block.");
            return Ok(());
        }
    };

    info!(
        trades = report.trades.len(),
        inserted = report.stats.inserted,
        stored_total = store.trade_count().await?,
        checkpoint = store.read_checkpoint().await?,
        "Indexing finished"
    );

    let summary = RunSummary {
        from_block: report.from_block,
        to_block: report.to_block,
        inserted_trades: report.trades.len(),
        market_slug: slug,
        market_id: report.trades.first().map(|t| t.market_id),
        sample_trades: &report.trades[..report.trades.len().min(SAMPLE_TRADES)],
        db_path: &db_path,
    };
    let json = serde_json::to_string_pretty(&serde_json::json!({ "stage2": summary }))?;

    match args.output {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&path, json).await?;
            info!("Output written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Warm the market table before indexing. A registry failure is not fatal: the
/// resolver gets another chance per unknown token during the run.
async fn prefetch_markets<D: MarketDiscovery>(discovery: &D, slug: &str) -> Option<usize> {
    info!("Running market discovery for slug: {slug}");
    match discovery.refresh(slug).await {
        Ok(stored) => Some(stored),
        Err(e) => {
            warn!(slug, retryable = e.is_retryable(), "Market discovery failed, indexing anyway: {e}");
            None
        }
    }
}

async fn run_discover(cfg: Config, event_slug: String, db: Option<String>) -> Result<()> {
    let store = Store::open(db.as_deref().unwrap_or(&cfg.db_path)).await?;
    let registry = GammaRegistry::new(&cfg, store)?;
    let stored = registry.refresh(&event_slug).await?;
    info!("Stored {stored} markets for {event_slug}");
    Ok(())
}

async fn run_serve(cfg: Config, db: Option<String>, host: String, port: Option<u16>) -> Result<()> {
    let db_path = db.unwrap_or_else(|| cfg.db_path.clone());
    let store = Store::open(&db_path).await?;
    let app = router(ApiState { store });

    let bind_addr = format!("{host}:{}", port.unwrap_or(cfg.api_port));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr} using DB: {db_path}");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Remove the database file and its WAL sidecars.
async fn reset_db(db_path: &str) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let path = format!("{db_path}{suffix}");
        if Path::new(&path).exists() {
            tokio::fs::remove_file(&path).await?;
        }
    }
    info!("Database reset: {db_path}");
    Ok(())
}
