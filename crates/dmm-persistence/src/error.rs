//! Persistence error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Checkpoint would move backwards: stored {stored}, attempted {attempted}")]
    Regression { stored: u64, attempted: u64 },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
