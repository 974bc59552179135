//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] dmm_rpc::RpcError),

    #[error("Sidechain error: {0}")]
    Sidechain(#[from] dmm_sidechain::SidechainError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] dmm_settlement::SettlementError),

    #[error("Follower error: {0}")]
    Follower(#[from] dmm_follower::FollowerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] dmm_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
