//! Ledger follower.
//!
//! Polls head height, fetches blocks strictly in order, hands every operation
//! to an `OperationHandler` and checkpoints after each fully dispatched block.

pub mod error;
pub mod follower;

pub use error::{FollowerError, FollowerResult};
pub use follower::{Follower, FollowerConfig, OperationHandler, PollOutcome};
