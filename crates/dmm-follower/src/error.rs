//! Follower error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FollowerError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] dmm_rpc::RpcError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] dmm_persistence::PersistenceError),
}

pub type FollowerResult<T> = Result<T, FollowerError>;
