//! Block-following loop.
//!
//! Invariants:
//! - Blocks are processed one at a time in strictly increasing, gapless order.
//! - The checkpoint is written only after every operation of a block has been
//!   handled, and never moves backwards.
//! - A block that cannot be fetched, or comes back without a transaction
//!   list, is retried at the same height; nothing past it is processed.
//!
//! Restarting from the checkpoint redelivers at most the block that was in
//! flight, so handlers must tolerate at-least-once delivery.

use crate::error::FollowerResult;
use dmm_core::{Block, BoxFuture, Operation, OperationContext};
use dmm_persistence::{Checkpoint, CheckpointStore};
use dmm_rpc::LedgerReader;
use dmm_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Receives every operation of every processed block, in chain order.
///
/// Handlers own their error handling; the follower awaits each call to
/// completion before moving to the next operation.
pub trait OperationHandler: Send + Sync {
    fn handle<'a>(&'a self, op: &'a Operation, ctx: &'a OperationContext) -> BoxFuture<'a, ()>;
}

impl<H: OperationHandler + ?Sized> OperationHandler for Arc<H> {
    fn handle<'a>(&'a self, op: &'a Operation, ctx: &'a OperationContext) -> BoxFuture<'a, ()> {
        (**self).handle(op, ctx)
    }
}

/// Follower configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerConfig {
    /// Delay between head polls (ms). Default: 1,000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay after a block could not be loaded (ms). Default: 1,000.
    #[serde(default = "default_missing_block_delay_ms")]
    pub missing_block_delay_ms: u64,
    /// Lag at which a warning is logged. Default: 20.
    #[serde(default = "default_lag_warning_blocks")]
    pub lag_warning_blocks: u64,
    /// Blocks to stay behind the reported head. Default: 0.
    #[serde(default)]
    pub blocks_behind_head: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_missing_block_delay_ms() -> u64 {
    1_000
}

fn default_lag_warning_blocks() -> u64 {
    20
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            missing_block_delay_ms: default_missing_block_delay_ms(),
            lag_warning_blocks: default_lag_warning_blocks(),
            blocks_behind_head: 0,
        }
    }
}

/// What one poll achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Head has not moved past the checkpoint.
    Idle { last: u64 },
    /// Every block up to head was processed.
    CaughtUp { last: u64 },
    /// `height` could not be loaded; it is retried on the next poll.
    Stalled { last: u64, height: u64 },
}

enum BlockStatus {
    Processed,
    Unavailable,
}

pub struct Follower<L, S, H> {
    ledger: L,
    store: S,
    handler: H,
    config: FollowerConfig,
    last: Option<u64>,
}

impl<L: LedgerReader, S: CheckpointStore, H: OperationHandler> Follower<L, S, H> {
    pub fn new(ledger: L, store: S, handler: H, config: FollowerConfig) -> Self {
        Self {
            ledger,
            store,
            handler,
            config,
            last: None,
        }
    }

    /// Last processed height, once known.
    pub fn last_processed(&self) -> Option<u64> {
        self.last
    }

    /// Load the stored checkpoint without touching the ledger.
    ///
    /// `None` means there is no checkpoint yet; the start height is then
    /// taken from head on the first successful poll.
    pub fn restore(&mut self) -> FollowerResult<Option<u64>> {
        if self.last.is_none() {
            self.last = self.store.load()?.map(|c| c.last_processed_height);
            if let Some(last) = self.last {
                info!(last, "Restored checkpoint");
            }
        }
        Ok(self.last)
    }

    /// Restore the checkpoint, or start just below head when there is none.
    pub async fn initialize(&mut self) -> FollowerResult<u64> {
        if let Some(last) = self.restore()? {
            return Ok(last);
        }

        let head = self.effective_head().await?;
        let last = head.saturating_sub(1);
        info!(head, last, "No checkpoint, starting at head");
        self.last = Some(last);
        Ok(last)
    }

    /// Poll head once and process every available block up to it.
    pub async fn poll_once(&mut self) -> FollowerResult<PollOutcome> {
        let last = self.initialize().await?;
        let head = self.effective_head().await?;

        let behind = head.saturating_sub(last);
        Metrics::head_polled(head, behind);
        if behind >= self.config.lag_warning_blocks {
            warn!(behind, head, last, "Service is blocks behind");
        }

        if head <= last {
            return Ok(PollOutcome::Idle { last });
        }

        let mut last = last;
        while head > last {
            let height = last + 1;
            match self.process_block(height).await {
                BlockStatus::Processed => last = height,
                BlockStatus::Unavailable => {
                    tokio::time::sleep(Duration::from_millis(self.config.missing_block_delay_ms))
                        .await;
                    return Ok(PollOutcome::Stalled { last, height });
                }
            }
        }

        Ok(PollOutcome::CaughtUp { last })
    }

    /// Follow the ledger forever. Poll errors are logged and retried.
    pub async fn run(mut self) {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Error polling ledger");
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn effective_head(&self) -> FollowerResult<u64> {
        let head = self.ledger.head_block_number().await?;
        Ok(head.saturating_sub(self.config.blocks_behind_head))
    }

    async fn process_block(&mut self, height: u64) -> BlockStatus {
        if height % 1000 == 0 {
            info!(height, "Processing block");
        } else {
            debug!(height, "Processing block");
        }

        let block = match self.ledger.get_block(height).await {
            Ok(Some(block)) if block.is_complete() => block,
            Ok(_) => {
                debug!(height, "Block not available yet");
                return BlockStatus::Unavailable;
            }
            Err(e) => {
                warn!(height, error = %e, "Error loading block");
                return BlockStatus::Unavailable;
            }
        };

        self.dispatch(&block, height).await;
        self.advance(height);
        BlockStatus::Processed
    }

    async fn dispatch(&self, block: &Block, height: u64) {
        for (ctx, op) in block.operations(height) {
            self.handler.handle(op, &ctx).await;
        }
    }

    fn advance(&mut self, height: u64) {
        self.last = Some(height);
        Metrics::block_processed(height);

        // The in-memory position still advances; the next successful save
        // carries the checkpoint forward.
        if let Err(e) = self.store.save(Checkpoint::new(height)) {
            error!(height, error = %e, "Failed to save checkpoint");
        }
    }
}
