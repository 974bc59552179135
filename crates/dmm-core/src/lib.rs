//! Core domain types for the DEC market-maker settlement agent.
//!
//! This crate provides fundamental types used throughout the service:
//! - `Amount`, `Price`: Fixed-decimal numeric types with wire formatting
//! - `AssetAmount`: Ledger amounts with a unit suffix (e.g. `"100.000 HIVE"`)
//! - `Block`, `Operation`, `TransferOp`: Ledger block model
//! - `Clock`: Injectable time source for health and retry bookkeeping

pub mod asset;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod ledger;

pub use asset::AssetAmount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{Amount, Price, PRICE_PRECISION, TOKEN_PRECISION};
pub use error::{CoreError, Result};
pub use ledger::{Block, Operation, OperationContext, Transaction, TransferOp};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
