//! Transport seam for node calls.
//!
//! `NodeTransport` sends one JSON-RPC request to one endpoint and normalizes
//! the heterogeneous node responses into `RpcResult<Value>`. Everything above
//! this layer only ever sees `Ok(result)` or a typed `RpcError`.

use crate::error::{RpcError, RpcResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

pub use dmm_core::BoxFuture;

/// Sends a single request to a single node.
pub trait NodeTransport: Send + Sync {
    /// Call `method` (e.g. `condenser_api.get_block`) on `endpoint`.
    fn call<'a>(
        &'a self,
        endpoint: &'a str,
        method: &'a str,
        params: &'a Value,
    ) -> BoxFuture<'a, RpcResult<Value>>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl JsonRpcResponse {
    fn into_result(self) -> RpcResult<Value> {
        match (self.error, self.result) {
            (Some(err), _) => Err(RpcError::Node {
                code: err.code,
                message: err.message,
            }),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// JSON-RPC 2.0 over HTTP POST.
pub struct HttpTransport {
    client: Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> RpcResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn post(&self, endpoint: &str, method: &str, params: &Value) -> RpcResult<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        trace!(endpoint, method, id = request.id, "JSON-RPC request");

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Transport(format!("HTTP {status}: {body}")));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(format!("Failed to parse response: {e}")))?;

        body.into_result()
    }
}

impl NodeTransport for HttpTransport {
    fn call<'a>(
        &'a self,
        endpoint: &'a str,
        method: &'a str,
        params: &'a Value,
    ) -> BoxFuture<'a, RpcResult<Value>> {
        Box::pin(self.post(endpoint, method, params))
    }
}
