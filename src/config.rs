use crate::error::{AppError, Result};

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Number of trades echoed back in the run summary.
pub const SAMPLE_TRADES: usize = 5;

/// Default page size for the trades endpoint.
pub const DEFAULT_TRADES_LIMIT: i64 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    /// Polygon JSON-RPC endpoint (RPC_URL). Only required for indexing.
    pub rpc_url: Option<String>,
    pub gamma_api_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Timeout applied to every registry request (HTTP_TIMEOUT_SECS).
    pub http_timeout_secs: u64,
    /// Restrict `eth_getLogs` to these emitters (EXCHANGE_ADDRESSES, comma-separated).
    /// Empty means any contract emitting the OrderFilled topic.
    /// Example: "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E,0xC5d563a36AE78145C45a50134d48A1215220f80a"
    pub exchange_addresses: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            rpc_url: std::env::var("RPC_URL").ok().filter(|s| !s.trim().is_empty()),
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| GAMMA_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "indexer.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    AppError::Config("HTTP_TIMEOUT_SECS must be a whole number of seconds".to_string())
                })?,
            exchange_addresses: parse_list(&std::env::var("EXCHANGE_ADDRESSES").unwrap_or_default()),
        })
    }

    pub fn require_rpc_url(&self) -> Result<&str> {
        self.rpc_url
            .as_deref()
            .ok_or_else(|| AppError::Config("RPC_URL environment variable not set".to_string()))
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
