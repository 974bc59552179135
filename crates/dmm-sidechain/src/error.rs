//! Sidechain error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SidechainError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SidechainResult<T> = Result<T, SidechainError>;
