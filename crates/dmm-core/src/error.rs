//! Error types for dmm-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid asset amount: {0}")]
    InvalidAsset(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
