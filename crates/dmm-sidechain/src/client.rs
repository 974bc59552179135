//! HTTP client for the sidechain contract RPC.
//!
//! Contract tables are read through `{rpc_url}/contracts` (`find`/`findOne`),
//! transactions through `{rpc_url}/blockchain` (`getTransactionInfo`).

use crate::error::{SidechainError, SidechainResult};
use crate::types::{BookOrder, PoolSnapshot, SidechainTx, TxLogs};
use dmm_core::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default timeout for sidechain requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the settlement pipeline and quote API read from the sidechain.
pub trait SidechainApi: Send + Sync {
    /// Pool reserves for a pair key such as `"SWAP.HIVE:DEC"`.
    fn pool<'a>(&'a self, token_pair: &'a str) -> BoxFuture<'a, SidechainResult<Option<PoolSnapshot>>>;

    /// Cheapest `limit` sell orders for `symbol`, best price first.
    fn sell_book<'a>(
        &'a self,
        symbol: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, SidechainResult<Vec<BookOrder>>>;

    /// Transaction info, or `None` if the sidechain has not processed it yet.
    fn transaction_info<'a>(&'a self, tx_id: &'a str)
        -> BoxFuture<'a, SidechainResult<Option<SidechainTx>>>;
}

impl<A: SidechainApi + ?Sized> SidechainApi for Arc<A> {
    fn pool<'a>(&'a self, token_pair: &'a str) -> BoxFuture<'a, SidechainResult<Option<PoolSnapshot>>> {
        (**self).pool(token_pair)
    }

    fn sell_book<'a>(
        &'a self,
        symbol: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, SidechainResult<Vec<BookOrder>>> {
        (**self).sell_book(symbol, limit)
    }

    fn transaction_info<'a>(
        &'a self,
        tx_id: &'a str,
    ) -> BoxFuture<'a, SidechainResult<Option<SidechainTx>>> {
        (**self).transaction_info(tx_id)
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransactionInfo {
    transaction_id: String,
    #[serde(default)]
    logs: Option<String>,
}

/// JSON-RPC client for the sidechain node.
pub struct SidechainClient {
    client: Client,
    rpc_url: String,
}

impl SidechainClient {
    /// Create a new client for `rpc_url` (e.g. `"https://api.hive-engine.com/rpc"`).
    pub fn new(rpc_url: impl Into<String>) -> SidechainResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SidechainError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn rpc(&self, path: &str, method: &str, params: Value) -> SidechainResult<Value> {
        let url = format!("{}/{path}", self.rpc_url);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SidechainError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SidechainError::HttpClient(format!("HTTP {status}: {body}")));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| SidechainError::HttpClient(format!("Failed to parse response: {e}")))?;

        if let Some(error) = body.error {
            return Err(SidechainError::Rpc(error.to_string()));
        }

        Ok(body.result.unwrap_or(Value::Null))
    }

    /// `findOne` on a contract table.
    pub async fn find_one(&self, contract: &str, table: &str, query: Value) -> SidechainResult<Value> {
        self.rpc(
            "contracts",
            "findOne",
            json!({ "contract": contract, "table": table, "query": query }),
        )
        .await
    }

    /// `find` on a contract table.
    pub async fn find(
        &self,
        contract: &str,
        table: &str,
        query: Value,
        limit: u32,
        indexes: Value,
    ) -> SidechainResult<Value> {
        self.rpc(
            "contracts",
            "find",
            json!({
                "contract": contract,
                "table": table,
                "query": query,
                "limit": limit,
                "offset": 0,
                "indexes": indexes,
            }),
        )
        .await
    }

    async fn fetch_pool(&self, token_pair: &str) -> SidechainResult<Option<PoolSnapshot>> {
        let value = self
            .find_one("marketpools", "pools", json!({ "tokenPair": token_pair }))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let pool = serde_json::from_value(value)
            .map_err(|e| SidechainError::Parse(format!("pool {token_pair}: {e}")))?;
        Ok(Some(pool))
    }

    async fn fetch_sell_book(&self, symbol: &str, limit: u32) -> SidechainResult<Vec<BookOrder>> {
        let value = self
            .find(
                "market",
                "sellBook",
                json!({ "symbol": symbol }),
                limit,
                json!([{ "index": "priceDec", "descending": false }]),
            )
            .await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value)
            .map_err(|e| SidechainError::Parse(format!("sell book {symbol}: {e}")))
    }

    async fn fetch_transaction_info(&self, tx_id: &str) -> SidechainResult<Option<SidechainTx>> {
        let value = self
            .rpc("blockchain", "getTransactionInfo", json!({ "txid": tx_id }))
            .await?;
        parse_transaction_info(value)
    }
}

fn parse_transaction_info(value: Value) -> SidechainResult<Option<SidechainTx>> {
    if value.is_null() {
        return Ok(None);
    }

    let raw: RawTransactionInfo = serde_json::from_value(value)
        .map_err(|e| SidechainError::Parse(format!("transaction info: {e}")))?;
    let logs = TxLogs::parse(raw.logs.as_deref().unwrap_or_default())?;

    debug!(
        tx_id = %raw.transaction_id,
        events = logs.events.len(),
        errors = logs.errors.len(),
        "Fetched sidechain transaction"
    );

    Ok(Some(SidechainTx {
        id: raw.transaction_id,
        logs,
    }))
}

impl SidechainApi for SidechainClient {
    fn pool<'a>(&'a self, token_pair: &'a str) -> BoxFuture<'a, SidechainResult<Option<PoolSnapshot>>> {
        Box::pin(self.fetch_pool(token_pair))
    }

    fn sell_book<'a>(
        &'a self,
        symbol: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, SidechainResult<Vec<BookOrder>>> {
        Box::pin(self.fetch_sell_book(symbol, limit))
    }

    fn transaction_info<'a>(
        &'a self,
        tx_id: &'a str,
    ) -> BoxFuture<'a, SidechainResult<Option<SidechainTx>>> {
        Box::pin(self.fetch_transaction_info(tx_id))
    }
}
