//! Hand-written mocks of the settlement seams.

use crate::error::{SettlementError, SettlementResult};
use crate::inventory::InventoryApi;
use dmm_core::{Amount, AssetAmount, BoxFuture, OperationContext};
use dmm_rpc::{LedgerWriter, RpcError, RpcResult, TxReceipt};
use dmm_sidechain::{BookOrder, PoolSnapshot, SidechainApi, SidechainResult, SidechainTx, TxLogs};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Records every broadcast and hands out ids `tx-1`, `tx-2`, ...
#[derive(Default)]
pub(crate) struct MockWriter {
    pub transfers: Mutex<Vec<(String, String, String)>>,
    pub custom_jsons: Mutex<Vec<(String, Value, bool)>>,
    pub fail_transfers: Mutex<bool>,
    pub fail_custom_json: Mutex<bool>,
    next_id: AtomicU64,
}

impl MockWriter {
    fn receipt(&self) -> TxReceipt {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        TxReceipt {
            id: format!("tx-{id}"),
            block_num: None,
        }
    }

    fn failure() -> RpcError {
        RpcError::BroadcastFailed {
            attempts: 3,
            last_error: "connection refused".into(),
        }
    }
}

impl LedgerWriter for MockWriter {
    fn transfer<'a>(
        &'a self,
        to: &'a str,
        amount: &'a AssetAmount,
        memo: &'a str,
    ) -> BoxFuture<'a, RpcResult<TxReceipt>> {
        let result = if *self.fail_transfers.lock() {
            Err(Self::failure())
        } else {
            self.transfers
                .lock()
                .push((to.to_string(), amount.to_wire(), memo.to_string()));
            Ok(self.receipt())
        };
        Box::pin(async move { result })
    }

    fn custom_json<'a>(
        &'a self,
        id: &'a str,
        payload: &'a Value,
        use_active: bool,
    ) -> BoxFuture<'a, RpcResult<TxReceipt>> {
        let result = if *self.fail_custom_json.lock() {
            Err(Self::failure())
        } else {
            self.custom_jsons
                .lock()
                .push((id.to_string(), payload.clone(), use_active));
            Ok(self.receipt())
        };
        Box::pin(async move { result })
    }
}

/// Serves a fixed pool and scripted transactions.
#[derive(Default)]
pub(crate) struct MockSidechain {
    pub pool: Mutex<Option<PoolSnapshot>>,
    pub pool_calls: Mutex<u32>,
    pub txs: Mutex<HashMap<String, SidechainTx>>,
}

impl MockSidechain {
    pub fn with_pool(pool: PoolSnapshot) -> Self {
        let sidechain = Self::default();
        *sidechain.pool.lock() = Some(pool);
        sidechain
    }

    pub fn put_tx(&self, id: &str, logs: &str) {
        self.txs.lock().insert(
            id.to_string(),
            SidechainTx {
                id: id.to_string(),
                logs: TxLogs::parse(logs).unwrap(),
            },
        );
    }
}

impl SidechainApi for MockSidechain {
    fn pool<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SidechainResult<Option<PoolSnapshot>>> {
        *self.pool_calls.lock() += 1;
        let pool = self.pool.lock().clone();
        Box::pin(async move { Ok(pool) })
    }

    fn sell_book<'a>(&'a self, _: &'a str, _: u32) -> BoxFuture<'a, SidechainResult<Vec<BookOrder>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn transaction_info<'a>(
        &'a self,
        tx_id: &'a str,
    ) -> BoxFuture<'a, SidechainResult<Option<SidechainTx>>> {
        let tx = self.txs.lock().get(tx_id).cloned();
        Box::pin(async move { Ok(tx) })
    }
}

/// Fixed game-ledger balance.
pub(crate) struct MockInventory {
    pub balance: Mutex<Option<Amount>>,
}

impl MockInventory {
    pub fn new(balance: Amount) -> Self {
        Self {
            balance: Mutex::new(Some(balance)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            balance: Mutex::new(None),
        }
    }
}

impl InventoryApi for MockInventory {
    fn balance<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SettlementResult<Amount>> {
        let result = self
            .balance
            .lock()
            .ok_or_else(|| SettlementError::Inventory("HTTP 503".into()));
        Box::pin(async move { result })
    }
}

pub(crate) fn context(trx_id: &str) -> OperationContext {
    OperationContext {
        block_num: 52_000_000,
        block_id: "0319a080".into(),
        previous: "0319a07f".into(),
        trx_id: trx_id.into(),
        op_index: 0,
        block_time: chrono::Utc::now(),
    }
}
