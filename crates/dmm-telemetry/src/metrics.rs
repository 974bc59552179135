//! Prometheus metrics for the settlement agent.
//!
//! Covers:
//! - Follower progress and lag
//! - Node health in the failover client
//! - Settlement and replenishment outcomes
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which must crash at startup. These panics
//! only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};

/// Last block height whose operations were fully dispatched.
pub static LAST_PROCESSED_HEIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "dmm_last_processed_height",
        "Last block height whose operations were fully dispatched"
    )
    .unwrap()
});

/// Effective head height seen on the last poll.
pub static HEAD_HEIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("dmm_head_height", "Effective head block height").unwrap()
});

/// Blocks between the checkpoint and head.
pub static BLOCKS_BEHIND: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("dmm_blocks_behind", "Blocks between checkpoint and head").unwrap()
});

/// Total blocks processed.
pub static BLOCKS_PROCESSED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("dmm_blocks_processed_total", "Total blocks processed").unwrap()
});

/// Nodes disabled by the failover client.
/// Labels: endpoint
pub static NODE_DISABLED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dmm_node_disabled_total",
        "Total times a node was disabled for exceeding the error limit",
        &["endpoint"]
    )
    .unwrap()
});

/// Healthy nodes after the last health change.
pub static NODES_HEALTHY: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("dmm_nodes_healthy", "Nodes currently in rotation").unwrap()
});

/// Settlement outcomes.
/// Labels: outcome (credited/refunded/ignored/failed)
pub static SETTLEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dmm_settlements_total",
        "Settlement pipeline outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Replenishment outcomes.
/// Labels: outcome (completed/aborted)
pub static REPLENISHMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dmm_replenishments_total",
        "Inventory replenishment outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a fully processed block.
    pub fn block_processed(height: u64) {
        LAST_PROCESSED_HEIGHT.set(height as i64);
        BLOCKS_PROCESSED_TOTAL.inc();
    }

    /// Record head height and lag after a poll.
    pub fn head_polled(head: u64, behind: u64) {
        HEAD_HEIGHT.set(head as i64);
        BLOCKS_BEHIND.set(behind as i64);
    }

    /// Record a node being disabled.
    pub fn node_disabled(endpoint: &str) {
        NODE_DISABLED_TOTAL.with_label_values(&[endpoint]).inc();
    }

    /// Update the healthy node count.
    pub fn nodes_healthy(count: usize) {
        NODES_HEALTHY.set(count as i64);
    }

    /// Record a settlement outcome.
    pub fn settlement(outcome: &str) {
        SETTLEMENTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a replenishment outcome.
    pub fn replenishment(outcome: &str) {
        REPLENISHMENTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
