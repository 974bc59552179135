//! Failover client over a pool of ledger nodes.
//!
//! Read calls walk the routable nodes in configured order and return the
//! first success. Broadcasts go to the first routable node only: resubmitting
//! a signed transaction elsewhere inside the same call could duplicate its
//! effects, so retries belong to the caller (see `Broadcaster`).

use crate::error::{RpcError, RpcResult};
use crate::node::{ErrorOutcome, FailoverConfig, NodePool, RpcNode};
use crate::transport::NodeTransport;
use dmm_core::{Clock, SystemClock};
use dmm_telemetry::Metrics;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, warn};

/// Routes calls across nodes and maintains their health.
pub struct FailoverClient<T, C = SystemClock> {
    transport: T,
    clock: C,
    pool: Mutex<NodePool>,
}

impl<T: NodeTransport> FailoverClient<T, SystemClock> {
    pub fn new<I, S>(transport: T, endpoints: I, config: FailoverConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_clock(transport, endpoints, config, SystemClock)
    }
}

impl<T: NodeTransport, C: Clock> FailoverClient<T, C> {
    pub fn with_clock<I, S>(transport: T, endpoints: I, config: FailoverConfig, clock: C) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transport,
            clock,
            pool: Mutex::new(NodePool::new(endpoints, config)),
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of node health, for logging and diagnostics.
    pub fn nodes(&self) -> Vec<RpcNode> {
        self.pool.lock().nodes().to_vec()
    }

    /// Read-style call: first node that answers wins.
    pub async fn call(&self, api: &str, method: &str, params: Value) -> RpcResult<Value> {
        let full_method = format!("{api}.{method}");
        let order = self.pool.lock().routable(self.clock.now_ms());
        let mut last_error = String::from("no routable nodes");

        for idx in order {
            let endpoint = self.pool.lock().endpoint(idx).to_string();

            match self.transport.call(&endpoint, &full_method, &params).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        endpoint = %endpoint,
                        method = %full_method,
                        error = %e,
                        "Error calling node"
                    );
                    self.note_error(idx, &endpoint);
                    last_error = e.to_string();
                }
            }
        }

        error!(method = %full_method, "All nodes failed calling");
        Err(RpcError::NodesExhausted {
            method: full_method,
            last_error,
        })
    }

    /// Broadcast-style call: one node, no transparent failover.
    ///
    /// Broadcast failures do not count against node health; a rejected
    /// transaction says nothing about the node that relayed the rejection.
    pub async fn broadcast(&self, api: &str, method: &str, params: Value) -> RpcResult<Value> {
        let full_method = format!("{api}.{method}");
        let endpoint = {
            let mut pool = self.pool.lock();
            let order = pool.routable(self.clock.now_ms());
            order.first().map(|&idx| pool.endpoint(idx).to_string())
        };

        let Some(endpoint) = endpoint else {
            error!(method = %full_method, "No routable node for broadcast");
            return Err(RpcError::NodesExhausted {
                method: full_method,
                last_error: "no routable nodes".to_string(),
            });
        };

        self.transport
            .call(&endpoint, &full_method, &params)
            .await
            .map_err(|e| {
                warn!(
                    endpoint = %endpoint,
                    method = %full_method,
                    error = %e,
                    "Error broadcasting"
                );
                e
            })
    }

    fn note_error(&self, idx: usize, endpoint: &str) {
        let mut pool = self.pool.lock();
        match pool.record_error(idx, self.clock.now_ms()) {
            ErrorOutcome::Counted { .. } => {}
            ErrorOutcome::Disabled => {
                error!(endpoint = %endpoint, "Disabling node due to too many errors");
                Metrics::node_disabled(endpoint);
            }
            ErrorOutcome::AllReenabled => {
                Metrics::node_disabled(endpoint);
                error!("All nodes disabled, re-enabling them all");
            }
        }
        Metrics::nodes_healthy(pool.healthy_count());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::BoxFuture;
    use dmm_core::ManualClock;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Transport where selected endpoints always fail.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub failing: Mutex<HashSet<String>>,
        pub calls: Mutex<Vec<(String, String)>>,
        pub response: Mutex<Value>,
    }

    impl ScriptedTransport {
        pub fn failing(endpoints: &[&str]) -> Self {
            let transport = Self::default();
            transport
                .failing
                .lock()
                .extend(endpoints.iter().map(|e| e.to_string()));
            transport
        }

        pub fn called_endpoints(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(e, _)| e.clone()).collect()
        }
    }

    impl NodeTransport for ScriptedTransport {
        fn call<'a>(
            &'a self,
            endpoint: &'a str,
            method: &'a str,
            _params: &'a Value,
        ) -> BoxFuture<'a, RpcResult<Value>> {
            self.calls
                .lock()
                .push((endpoint.to_string(), method.to_string()));
            let result = if self.failing.lock().contains(endpoint) {
                Err(RpcError::Transport("connection refused".to_string()))
            } else {
                Ok(self.response.lock().clone())
            };
            Box::pin(async move { result })
        }
    }

    fn client(
        transport: ScriptedTransport,
        limit: u32,
    ) -> (FailoverClient<ScriptedTransport, Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = FailoverConfig {
            error_limit: limit,
            ..Default::default()
        };
        let client = FailoverClient::with_clock(
            transport,
            ["http://a", "http://b", "http://c"],
            config,
            clock.clone(),
        );
        (client, clock)
    }

    #[tokio::test]
    async fn test_first_healthy_node_wins() {
        let transport = ScriptedTransport::failing(&["http://a"]);
        *transport.response.lock() = json!({"head_block_number": 10});
        let (client, _) = client(transport, 5);

        let result = client
            .call("condenser_api", "get_dynamic_global_properties", json!([]))
            .await
            .unwrap();

        assert_eq!(result["head_block_number"], 10);
        assert_eq!(
            client.transport.called_endpoints(),
            vec!["http://a", "http://b"]
        );
        assert_eq!(
            client.transport.calls.lock()[1].1,
            "condenser_api.get_dynamic_global_properties"
        );
    }

    #[tokio::test]
    async fn test_failing_node_disabled_and_skipped_until_cooldown() {
        let transport = ScriptedTransport::failing(&["http://a"]);
        let (client, clock) = client(transport, 3);

        for _ in 0..3 {
            client.call("api", "m", json!([])).await.unwrap();
            clock.advance_ms(1_000);
        }
        assert!(!client.nodes()[0].healthy);

        client.transport.calls.lock().clear();
        client.call("api", "m", json!([])).await.unwrap();
        assert_eq!(client.transport.called_endpoints(), vec!["http://b"]);

        // After the hour-long cool-down node a is tried again
        clock.advance_ms(60 * 60 * 1000);
        client.transport.calls.lock().clear();
        client.call("api", "m", json!([])).await.unwrap();
        assert_eq!(
            client.transport.called_endpoints(),
            vec!["http://a", "http://b"]
        );
    }

    #[tokio::test]
    async fn test_all_nodes_failing_exhausts_then_reenables() {
        let transport = ScriptedTransport::failing(&["http://a", "http://b", "http://c"]);
        let (client, _) = client(transport, 1);

        let err = client.call("api", "m", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::NodesExhausted { .. }));

        // Third failure disabled the last healthy node, so everyone came back
        assert!(client.nodes().iter().all(|n| n.healthy));
    }

    #[tokio::test]
    async fn test_broadcast_uses_single_node() {
        let transport = ScriptedTransport::failing(&["http://a"]);
        let (client, _) = client(transport, 1);

        let err = client
            .broadcast("condenser_api", "broadcast_transaction_synchronous", json!([]))
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Transport(_)));
        assert_eq!(client.transport.called_endpoints(), vec!["http://a"]);
        // Broadcast errors leave health untouched
        assert!(client.nodes()[0].healthy);
    }
}
