//! Settlement of incoming payments.
//!
//! - `PaymentInterpreter`: memo decoding and purchase-instruction validation
//! - `pricing`: constant-product pool conversion and fee math
//! - `InventoryApi`: off-chain game ledger balances
//! - `SettlementPipeline`: convert, check inventory, credit or refund
//! - `Replenisher`: sequential deposit → buy → transfer worker

pub mod config;
pub mod error;
pub mod interpreter;
pub mod inventory;
pub mod journal;
pub mod pipeline;
pub mod pricing;
pub mod replenish;

#[cfg(test)]
mod test_support;

pub use config::{ReplenishConfig, SettlementConfig, SidechainSettings};
pub use error::{SettlementError, SettlementResult};
pub use interpreter::{decode_memo, MemoPayload, PaymentInterpreter, PurchaseInstruction, Rejection};
pub use inventory::{GameApiClient, InventoryApi};
pub use journal::{JournalEntry, SharedJournal};
pub use pipeline::{SettlementOutcome, SettlementPipeline};
pub use pricing::{apply_fee, quote_from_base, quote_from_base_capped, quote_to_base, Conversion};
pub use replenish::{ReplenishStep, Replenisher, ReplenishmentOrder, ReplenishmentOutcome};
