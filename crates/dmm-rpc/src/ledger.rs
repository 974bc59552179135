//! Ledger read API.

use crate::error::{RpcError, RpcResult};
use crate::failover::FailoverClient;
use crate::transport::{BoxFuture, NodeTransport};
use dmm_core::{Block, Clock};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const CONDENSER_API: &str = "condenser_api";

/// Read access to the base ledger, as the follower needs it.
pub trait LedgerReader: Send + Sync {
    /// Current head block number.
    fn head_block_number(&self) -> BoxFuture<'_, RpcResult<u64>>;

    /// Block at `height`, or `None` if the node has nothing for it yet.
    fn get_block(&self, height: u64) -> BoxFuture<'_, RpcResult<Option<Block>>>;
}

impl<L: LedgerReader + ?Sized> LedgerReader for Arc<L> {
    fn head_block_number(&self) -> BoxFuture<'_, RpcResult<u64>> {
        (**self).head_block_number()
    }

    fn get_block(&self, height: u64) -> BoxFuture<'_, RpcResult<Option<Block>>> {
        (**self).get_block(height)
    }
}

#[derive(Debug, Deserialize)]
struct DynamicGlobalProperties {
    head_block_number: u64,
}

fn parse_head(value: Value) -> RpcResult<u64> {
    let props: DynamicGlobalProperties = serde_json::from_value(value)
        .map_err(|e| RpcError::Decode(format!("dynamic global properties: {e}")))?;
    Ok(props.head_block_number)
}

fn parse_block(value: Value) -> RpcResult<Option<Block>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| RpcError::Decode(format!("block: {e}")))
}

impl<T: NodeTransport, C: Clock> LedgerReader for FailoverClient<T, C> {
    fn head_block_number(&self) -> BoxFuture<'_, RpcResult<u64>> {
        Box::pin(async move {
            let value = self
                .call(CONDENSER_API, "get_dynamic_global_properties", json!([]))
                .await?;
            parse_head(value)
        })
    }

    fn get_block(&self, height: u64) -> BoxFuture<'_, RpcResult<Option<Block>>> {
        Box::pin(async move {
            let value = self.call(CONDENSER_API, "get_block", json!([height])).await?;
            parse_block(value)
        })
    }
}
