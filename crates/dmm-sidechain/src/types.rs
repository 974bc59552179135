//! Sidechain data objects.

use crate::error::{SidechainError, SidechainResult};
use dmm_core::{Amount, Price};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reserves of a constant-product pool.
///
/// `base_quantity` is the wrapped base currency, `quote_quantity` the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    #[serde(default)]
    pub token_pair: String,
    pub base_quantity: Amount,
    pub quote_quantity: Amount,
}

impl PoolSnapshot {
    pub fn new(base_quantity: Amount, quote_quantity: Amount) -> Self {
        Self {
            token_pair: String::new(),
            base_quantity,
            quote_quantity,
        }
    }
}

/// One resting sell order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookOrder {
    pub account: String,
    pub symbol: String,
    pub quantity: Amount,
    pub price: Price,
}

/// `data` payload of a contract event. Only the fields the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEventData {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub quantity: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    #[serde(default)]
    pub contract: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: TxEventData,
}

/// Decoded `logs` of a sidechain transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLogs {
    #[serde(default)]
    pub events: Vec<TxEvent>,
    #[serde(default, deserialize_with = "error_messages")]
    pub errors: Vec<String>,
}

/// Contract errors arrive as strings or as objects; keep both as text.
fn error_messages<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|e| match e {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

impl TxLogs {
    /// Decode the JSON string the sidechain stores in `logs`.
    pub fn parse(raw: &str) -> SidechainResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| SidechainError::Parse(format!("tx logs: {e}")))
    }

    /// Events that credited `account`.
    pub fn credits_to<'a>(&'a self, account: &'a str) -> impl Iterator<Item = &'a TxEvent> + 'a {
        self.events
            .iter()
            .filter(move |e| e.data.to.as_deref() == Some(account))
    }

    /// Sum of quantities credited to `account`.
    pub fn total_credited(&self, account: &str) -> Amount {
        self.credits_to(account)
            .filter_map(|e| e.data.quantity)
            .sum()
    }
}

/// A sidechain transaction with its logs normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidechainTx {
    pub id: String,
    pub logs: TxLogs,
}

impl SidechainTx {
    /// First error the contract reported, if any.
    pub fn error(&self) -> Option<&str> {
        self.logs.errors.first().map(String::as_str)
    }

    pub fn succeeded(&self) -> bool {
        self.logs.errors.is_empty()
    }
}
