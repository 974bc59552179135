//! Journal records for settlement and replenishment outcomes.

use chrono::{DateTime, Utc};
use dmm_persistence::SettlementJournal;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Journal shared by the pipeline and the replenishment worker.
pub type SharedJournal = Arc<Mutex<SettlementJournal>>;

/// One journal line.
#[derive(Debug, Serialize)]
pub struct JournalEntry<'a, T: Serialize> {
    pub at: DateTime<Utc>,
    pub kind: &'static str,
    /// Ledger transaction that carried the payment.
    pub source_tx_id: &'a str,
    #[serde(flatten)]
    pub outcome: &'a T,
}

/// Append to the journal if one is configured. Failures are logged only.
pub(crate) fn record<T: Serialize>(
    journal: Option<&SharedJournal>,
    kind: &'static str,
    source_tx_id: &str,
    outcome: &T,
) {
    let Some(journal) = journal else {
        return;
    };

    let entry = JournalEntry {
        at: Utc::now(),
        kind,
        source_tx_id,
        outcome,
    };
    if let Err(e) = journal.lock().append(&entry) {
        error!(source_tx_id, error = %e, "Failed to journal {kind} outcome");
    }
}
