//! Node health bookkeeping.
//!
//! Pure state machine over the configured endpoints. The failover client
//! drives it; nothing here performs I/O.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health thresholds for node demotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Errors within the window before a node is disabled. Default: 5.
    #[serde(default = "default_error_limit")]
    pub error_limit: u32,
    /// Sliding window in which errors accumulate (ms). Default: 600,000 (10 minutes).
    #[serde(default = "default_error_window_ms")]
    pub error_window_ms: u64,
    /// How long a disabled node stays out of rotation (ms). Default: 3,600,000 (1 hour).
    #[serde(default = "default_disable_cooldown_ms")]
    pub disable_cooldown_ms: u64,
    /// Per-call HTTP timeout (ms). Default: 1,000.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_error_limit() -> u32 {
    5
}

fn default_error_window_ms() -> u64 {
    10 * 60 * 1000
}

fn default_disable_cooldown_ms() -> u64 {
    60 * 60 * 1000
}

fn default_request_timeout_ms() -> u64 {
    1_000
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            error_limit: default_error_limit(),
            error_window_ms: default_error_window_ms(),
            disable_cooldown_ms: default_disable_cooldown_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl FailoverConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Health record for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcNode {
    pub endpoint: String,
    pub healthy: bool,
    pub consecutive_errors: u32,
    pub last_error_at_ms: Option<u64>,
    pub disabled_at_ms: Option<u64>,
}

impl RpcNode {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            healthy: true,
            consecutive_errors: 0,
            last_error_at_ms: None,
            disabled_at_ms: None,
        }
    }

    fn enable(&mut self) {
        self.healthy = true;
        self.disabled_at_ms = None;
    }
}

/// What recording an error did to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// Error counted; node still in rotation.
    Counted { errors: u32 },
    /// Node reached the error limit and was disabled.
    Disabled,
    /// Node was disabled and no healthy node remained, so all were re-enabled.
    AllReenabled,
}

/// Ordered set of nodes with their health.
#[derive(Debug, Clone)]
pub struct NodePool {
    nodes: Vec<RpcNode>,
    config: FailoverConfig,
}

impl NodePool {
    pub fn new<I, S>(endpoints: I, config: FailoverConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: endpoints.into_iter().map(RpcNode::new).collect(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn endpoint(&self, idx: usize) -> &str {
        &self.nodes[idx].endpoint
    }

    pub fn nodes(&self) -> &[RpcNode] {
        &self.nodes
    }

    pub fn healthy_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.healthy).count()
    }

    /// Indices to try, in configured order.
    ///
    /// Disabled nodes whose cool-down has elapsed are re-enabled here,
    /// before they are handed out.
    pub fn routable(&mut self, now_ms: u64) -> Vec<usize> {
        let cooldown = self.config.disable_cooldown_ms;
        let mut order = Vec::with_capacity(self.nodes.len());

        for (idx, node) in self.nodes.iter_mut().enumerate() {
            if !node.healthy {
                let disabled_at = node.disabled_at_ms.unwrap_or(0);
                if now_ms < disabled_at.saturating_add(cooldown) {
                    continue;
                }
                node.enable();
            }
            order.push(idx);
        }

        order
    }

    /// Record a failed call against node `idx`.
    pub fn record_error(&mut self, idx: usize, now_ms: u64) -> ErrorOutcome {
        let window = self.config.error_window_ms;
        let limit = self.config.error_limit;
        let node = &mut self.nodes[idx];

        let within_window = node
            .last_error_at_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < window);

        node.consecutive_errors = if within_window {
            node.consecutive_errors + 1
        } else {
            1
        };
        node.last_error_at_ms = Some(now_ms);

        if node.consecutive_errors < limit {
            return ErrorOutcome::Counted {
                errors: node.consecutive_errors,
            };
        }

        node.healthy = false;
        node.disabled_at_ms = Some(now_ms);

        if self.healthy_count() == 0 {
            self.nodes.iter_mut().for_each(RpcNode::enable);
            return ErrorOutcome::AllReenabled;
        }

        ErrorOutcome::Disabled
    }
}
