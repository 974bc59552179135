//! Sidechain contract client.
//!
//! The sidechain hosts the wrapped base currency, token balances, the
//! constant-product pools used for pricing and the order book used for
//! replenishment purchases.

pub mod client;
pub mod confirm;
pub mod error;
pub mod types;

pub use client::{SidechainApi, SidechainClient};
pub use confirm::{ConfirmConfig, Confirmation, ConfirmationPoller};
pub use error::{SidechainError, SidechainResult};
pub use types::{BookOrder, PoolSnapshot, SidechainTx, TxEvent, TxEventData, TxLogs};
