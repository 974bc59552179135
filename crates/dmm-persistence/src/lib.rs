//! Durable state for the settlement agent.
//!
//! - `CheckpointStore`: last fully processed block height, written after
//!   every block
//! - `SettlementJournal`: append-only JSON Lines audit log of settlement and
//!   replenishment outcomes

pub mod checkpoint;
pub mod error;
pub mod journal;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use error::{PersistenceError, PersistenceResult};
pub use journal::SettlementJournal;
