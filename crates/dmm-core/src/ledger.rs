//! Ledger block model.
//!
//! Mirrors the condenser `get_block` response. Operations arrive as
//! `[name, body]` pairs; only transfers are decoded further.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A fetched block. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub block_id: String,
    #[serde(default)]
    pub previous: String,
    pub timestamp: NaiveDateTime,
    /// `None` when the node returned a block header without a transaction
    /// list, which happens for heights that have not been produced yet.
    #[serde(default)]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default)]
    pub transaction_ids: Vec<String>,
}

impl Block {
    pub fn block_time(&self) -> DateTime<Utc> {
        self.timestamp.and_utc()
    }

    /// Whether the block carries a transaction list at all.
    pub fn is_complete(&self) -> bool {
        self.transactions.is_some()
    }

    /// All operations in block order, each with its context.
    pub fn operations(&self, block_num: u64) -> impl Iterator<Item = (OperationContext, &Operation)> {
        let block_time = self.block_time();
        self.transactions
            .iter()
            .flatten()
            .enumerate()
            .flat_map(move |(trx_index, trx)| {
                let trx_id = self
                    .transaction_ids
                    .get(trx_index)
                    .cloned()
                    .unwrap_or_default();
                trx.operations
                    .iter()
                    .enumerate()
                    .map(move |(op_index, op)| {
                        let ctx = OperationContext {
                            block_num,
                            block_id: self.block_id.clone(),
                            previous: self.previous.clone(),
                            trx_id: trx_id.clone(),
                            op_index,
                            block_time,
                        };
                        (ctx, op)
                    })
            })
    }
}

/// A transaction: an ordered list of operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// A raw `[name, body]` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, Value)", into = "(String, Value)")]
pub struct Operation {
    pub name: String,
    pub body: Value,
}

impl Operation {
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Decode as a transfer, if it is one.
    pub fn as_transfer(&self) -> Option<TransferOp> {
        if self.name != "transfer" {
            return None;
        }
        serde_json::from_value(self.body.clone()).ok()
    }
}

impl From<(String, Value)> for Operation {
    fn from((name, body): (String, Value)) -> Self {
        Self { name, body }
    }
}

impl From<Operation> for (String, Value) {
    fn from(op: Operation) -> Self {
        (op.name, op.body)
    }
}

/// Body of a `transfer` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOp {
    pub from: String,
    pub to: String,
    /// Amount with unit suffix, kept raw so the original string can be refunded verbatim.
    pub amount: String,
    #[serde(default)]
    pub memo: String,
}

/// Where an operation sits on the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub block_num: u64,
    pub block_id: String,
    pub previous: String,
    pub trx_id: String,
    pub op_index: usize,
    pub block_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_block() -> Value {
        json!({
            "previous": "0000000a",
            "timestamp": "2021-03-01T12:00:03",
            "block_id": "0000000b",
            "transactions": [
                {"operations": [
                    ["vote", {"voter": "a"}],
                    ["transfer", {"from": "alice", "to": "mm", "amount": "1.000 HIVE", "memo": "hi"}]
                ]},
                {"operations": [
                    ["transfer", {"from": "bob", "to": "carol", "amount": "2.000 HBD", "memo": ""}]
                ]}
            ],
            "transaction_ids": ["t1", "t2"]
        })
    }

    #[test]
    fn test_block_operations_in_order() {
        let block: Block = serde_json::from_value(sample_block()).unwrap();
        let ops: Vec<_> = block.operations(11).collect();

        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].1.name, "vote");
        assert_eq!(ops[1].0.trx_id, "t1");
        assert_eq!(ops[1].0.op_index, 1);
        assert_eq!(ops[2].0.trx_id, "t2");
        assert_eq!(ops[2].0.block_num, 11);
        assert_eq!(ops[2].0.previous, "0000000a");
    }

    #[test]
    fn test_as_transfer() {
        let block: Block = serde_json::from_value(sample_block()).unwrap();
        let transfers: Vec<TransferOp> = block
            .operations(1)
            .filter_map(|(_, op)| op.as_transfer())
            .collect();

        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].from, "alice");
        assert_eq!(transfers[0].memo, "hi");
    }

    #[test]
    fn test_block_without_transactions_is_incomplete() {
        let block: Block = serde_json::from_value(json!({
            "timestamp": "2021-03-01T12:00:03"
        }))
        .unwrap();

        assert!(!block.is_complete());
        assert_eq!(block.operations(1).count(), 0);
    }
}
