//! Ledger write API.
//!
//! Keys never live in this process. Operations are handed to a `Signer`
//! (a remote custody service in production), and the signed transaction is
//! broadcast through the failover client. The same signed transaction is
//! resubmitted on retry, so a duplicate submission is rejected by the ledger
//! on transaction id instead of executing twice.

use crate::error::{RpcError, RpcResult};
use crate::failover::FailoverClient;
use crate::transport::{BoxFuture, NodeTransport};
use dmm_core::{AssetAmount, Clock, Operation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Which key authority a transaction must be signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    Active,
    Posting,
}

/// Turns unsigned operations into a signed transaction.
pub trait Signer: Send + Sync {
    fn sign<'a>(
        &'a self,
        operations: &'a [Operation],
        authority: Authority,
    ) -> BoxFuture<'a, RpcResult<Value>>;
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    operations: &'a [Operation],
    authority: Authority,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    transaction: Value,
}

/// Signer backed by an external custody service.
///
/// `POST {url}` with `{"operations": [...], "authority": "active"}`,
/// answered by `{"transaction": {...signed...}}`.
pub struct RemoteSigner {
    client: Client,
    url: String,
    auth_token: Option<String>,
}

impl RemoteSigner {
    pub fn new(url: impl Into<String>, auth_token: Option<String>, timeout: Duration) -> RpcResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Signer(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            auth_token,
        })
    }

    async fn request_signature(
        &self,
        operations: &[Operation],
        authority: Authority,
    ) -> RpcResult<Value> {
        let mut request = self.client.post(&self.url).json(&SignRequest {
            operations,
            authority,
        });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RpcError::Signer(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Signer(format!("HTTP {status}: {body}")));
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Signer(format!("Failed to parse response: {e}")))?;

        Ok(body.transaction)
    }
}

impl Signer for RemoteSigner {
    fn sign<'a>(
        &'a self,
        operations: &'a [Operation],
        authority: Authority,
    ) -> BoxFuture<'a, RpcResult<Value>> {
        Box::pin(self.request_signature(operations, authority))
    }
}

/// Id of a transaction accepted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub id: String,
    #[serde(default)]
    pub block_num: Option<u64>,
}

/// Write access to the base ledger.
pub trait LedgerWriter: Send + Sync {
    /// Transfer `amount` from the service account to `to`.
    fn transfer<'a>(
        &'a self,
        to: &'a str,
        amount: &'a AssetAmount,
        memo: &'a str,
    ) -> BoxFuture<'a, RpcResult<TxReceipt>>;

    /// Submit a structured action (`custom_json`) with the given id.
    fn custom_json<'a>(
        &'a self,
        id: &'a str,
        payload: &'a Value,
        use_active: bool,
    ) -> BoxFuture<'a, RpcResult<TxReceipt>>;
}

impl<W: LedgerWriter + ?Sized> LedgerWriter for Arc<W> {
    fn transfer<'a>(
        &'a self,
        to: &'a str,
        amount: &'a AssetAmount,
        memo: &'a str,
    ) -> BoxFuture<'a, RpcResult<TxReceipt>> {
        (**self).transfer(to, amount, memo)
    }

    fn custom_json<'a>(
        &'a self,
        id: &'a str,
        payload: &'a Value,
        use_active: bool,
    ) -> BoxFuture<'a, RpcResult<TxReceipt>> {
        (**self).custom_json(id, payload, use_active)
    }
}

/// Broadcast retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Submission attempts per transaction. Default: 3.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts (ms). Default: 1,000.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Builds, signs and broadcasts operations for the service account.
pub struct Broadcaster<T, C, S> {
    client: Arc<FailoverClient<T, C>>,
    signer: S,
    account: String,
    config: BroadcastConfig,
}

impl<T: NodeTransport, C: Clock, S: Signer> Broadcaster<T, C, S> {
    pub fn new(
        client: Arc<FailoverClient<T, C>>,
        signer: S,
        account: impl Into<String>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            client,
            signer,
            account: account.into(),
            config,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn transfer_op(&self, to: &str, amount: &AssetAmount, memo: &str) -> Operation {
        Operation::new(
            "transfer",
            json!({
                "from": self.account,
                "to": to,
                "amount": amount.to_wire(),
                "memo": memo,
            }),
        )
    }

    fn custom_json_op(&self, id: &str, payload: &Value, use_active: bool) -> Operation {
        let (required_auths, required_posting_auths) = if use_active {
            (vec![self.account.clone()], Vec::new())
        } else {
            (Vec::new(), vec![self.account.clone()])
        };

        Operation::new(
            "custom_json",
            json!({
                "required_auths": required_auths,
                "required_posting_auths": required_posting_auths,
                "id": id,
                "json": payload.to_string(),
            }),
        )
    }

    /// Sign once, then submit up to `max_attempts` times.
    async fn submit(&self, operation: Operation, authority: Authority) -> RpcResult<TxReceipt> {
        let name = operation.name.clone();
        let operations = [operation];
        let signed = self.signer.sign(&operations, authority).await?;
        let params = json!([signed]);

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            match self
                .client
                .broadcast("condenser_api", "broadcast_transaction_synchronous", params.clone())
                .await
            {
                Ok(value) => {
                    let receipt: TxReceipt = serde_json::from_value(value)
                        .map_err(|e| RpcError::Decode(format!("broadcast receipt: {e}")))?;
                    debug!(op = %name, id = %receipt.id, attempt, "Broadcast accepted");
                    return Ok(receipt);
                }
                Err(e) => {
                    warn!(op = %name, attempt, error = %e, "Error broadcasting operation");
                    last_error = e.to_string();
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                    }
                }
            }
        }

        error!(op = %name, attempts = self.config.max_attempts, "Broadcast failed");
        Err(RpcError::BroadcastFailed {
            attempts: self.config.max_attempts,
            last_error,
        })
    }
}

impl<T: NodeTransport, C: Clock, S: Signer> LedgerWriter for Broadcaster<T, C, S> {
    fn transfer<'a>(
        &'a self,
        to: &'a str,
        amount: &'a AssetAmount,
        memo: &'a str,
    ) -> BoxFuture<'a, RpcResult<TxReceipt>> {
        Box::pin(async move {
            info!(to, amount = %amount, memo, "Sending transfer");
            self.submit(self.transfer_op(to, amount, memo), Authority::Active)
                .await
        })
    }

    fn custom_json<'a>(
        &'a self,
        id: &'a str,
        payload: &'a Value,
        use_active: bool,
    ) -> BoxFuture<'a, RpcResult<TxReceipt>> {
        Box::pin(async move {
            let authority = if use_active {
                Authority::Active
            } else {
                Authority::Posting
            };
            self.submit(self.custom_json_op(id, payload, use_active), authority)
                .await
        })
    }
}
