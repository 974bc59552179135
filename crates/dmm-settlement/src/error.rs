//! Settlement error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] dmm_rpc::RpcError),

    #[error("Sidechain error: {0}")]
    Sidechain(#[from] dmm_sidechain::SidechainError),

    #[error("Inventory API error: {0}")]
    Inventory(String),

    #[error("Journal error: {0}")]
    Journal(#[from] dmm_persistence::PersistenceError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type SettlementResult<T> = Result<T, SettlementError>;
