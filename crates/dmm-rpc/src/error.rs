//! RPC error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("All nodes failed calling [{method}]: {last_error}")]
    NodesExhausted { method: String, last_error: String },

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Broadcast failed after {attempts} attempts: {last_error}")]
    BroadcastFailed { attempts: u32, last_error: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RpcResult<T> = Result<T, RpcError>;
