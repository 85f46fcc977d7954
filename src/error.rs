use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

/// Failure talking to the chain RPC node.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Network failure, timeout or empty response. Worth retrying later.
    #[error("transient RPC failure: {0}")]
    Transient(String),

    /// Malformed payload or a request the node rejects.
    #[error("permanent RPC failure: {0}")]
    Permanent(String),

    #[error("transaction receipt not found: {0}")]
    ReceiptNotFound(String),
}

impl ChainError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Transient(_))
    }
}

/// Failure talking to the Gamma market registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("transient registry failure: {0}")]
    Transient(String),

    #[error("permanent registry failure: {0}")]
    Permanent(String),
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Transient(_))
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        let server_side = e.status().is_some_and(|s| s.is_server_error());
        if e.is_timeout() || e.is_connect() || e.is_request() || server_side {
            RegistryError::Transient(e.to_string())
        } else {
            RegistryError::Permanent(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Chain RPC error: {0}")]
    Chain(#[from] ChainError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
