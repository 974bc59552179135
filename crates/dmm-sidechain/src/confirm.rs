//! Confirmation polling for sidechain transactions.
//!
//! A transaction broadcast on the base ledger is picked up by the sidechain
//! a few blocks later. Until then the lookup returns nothing, which is
//! retried; a lookup that returns contract errors is a terminal failure.

use crate::client::SidechainApi;
use crate::types::SidechainTx;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Polling bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmConfig {
    /// Retries after the first lookup. Default: 6.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between lookups (ms). Default: 5,000.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    6
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Result of polling for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Found, and the contract reported no errors.
    Confirmed(SidechainTx),
    /// Found, but the contract reported an error.
    Failed { tx_id: String, error: String },
    /// Never found within the retry budget.
    Exhausted { tx_id: String, attempts: u32 },
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed(_))
    }

    /// Human-readable failure reason, if not confirmed.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Confirmation::Confirmed(_) => None,
            Confirmation::Failed { error, .. } => Some(error.clone()),
            Confirmation::Exhausted { attempts, .. } => {
                Some(format!("Transaction not found after {attempts} lookups"))
            }
        }
    }
}

/// Bounded, fixed-backoff poller.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationPoller {
    config: ConfirmConfig,
}

impl ConfirmationPoller {
    pub fn new(config: ConfirmConfig) -> Self {
        Self { config }
    }

    /// Poll until the transaction is found or the retry budget is spent.
    ///
    /// Lookup errors are treated like "not yet findable".
    pub async fn confirm<A: SidechainApi + ?Sized>(&self, api: &A, tx_id: &str) -> Confirmation {
        let attempts = self.config.max_retries + 1;
        let delay = Duration::from_millis(self.config.retry_delay_ms);

        for attempt in 1..=attempts {
            match api.transaction_info(tx_id).await {
                Ok(Some(tx)) => {
                    return match tx.error() {
                        None => {
                            debug!(tx_id, attempt, "Sidechain transaction confirmed");
                            Confirmation::Confirmed(tx)
                        }
                        Some(error) => Confirmation::Failed {
                            tx_id: tx_id.to_string(),
                            error: error.to_string(),
                        },
                    };
                }
                Ok(None) => debug!(tx_id, attempt, "Sidechain transaction not found yet"),
                Err(e) => warn!(tx_id, attempt, error = %e, "Sidechain lookup failed"),
            }

            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        Confirmation::Exhausted {
            tx_id: tx_id.to_string(),
            attempts,
        }
    }
}
