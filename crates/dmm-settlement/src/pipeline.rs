//! Settlement pipeline.
//!
//! For each accepted purchase:
//! 1. Convert through a freshly fetched pool snapshot.
//! 2. Refund any part of the payment the conversion did not consume.
//! 3. Deduct the fee (3 dp).
//! 4. Check the game-ledger inventory; if short, refund the whole payment
//!    and stop.
//! 5. Broadcast the credit instruction.
//! 6. Queue the replenishment order for the worker.
//!
//! Any step that ends the purchase before the credit goes out refunds what
//! the payer is still owed. The credit and the replenishment are tracked as
//! separate outcomes.

use crate::config::SettlementConfig;
use crate::interpreter::{PaymentInterpreter, PurchaseInstruction, Rejection};
use crate::inventory::InventoryApi;
use crate::journal::{self, SharedJournal};
use crate::pricing::{apply_fee, quote_from_base_capped};
use crate::replenish::ReplenishmentOrder;
use dmm_core::{Amount, AssetAmount, BoxFuture, Operation, OperationContext, TransferOp};
use dmm_follower::OperationHandler;
use dmm_rpc::LedgerWriter;
use dmm_sidechain::SidechainApi;
use dmm_telemetry::Metrics;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Not a purchase; nothing happened.
    Ignored { rejection: Rejection },
    /// Buyer credited; replenishment queued.
    Credited {
        payer: String,
        recipient: String,
        symbol: String,
        paid: Amount,
        net: Amount,
        /// Unconsumed part of the payment that was sent back.
        partial_refund: Option<Amount>,
        credit_tx_id: String,
    },
    /// Purchase abandoned and the payment sent back; no credit, no
    /// replenishment.
    Refunded {
        payer: String,
        symbol: String,
        amount: String,
        reason: String,
        refund_tx_id: String,
    },
    /// Purchase abandoned and the refund could not be sent; needs operator
    /// attention.
    Failed { payer: String, reason: String },
}

impl SettlementOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SettlementOutcome::Ignored { .. } => "ignored",
            SettlementOutcome::Credited { .. } => "credited",
            SettlementOutcome::Refunded { .. } => "refunded",
            SettlementOutcome::Failed { .. } => "failed",
        }
    }
}

/// Ledger JSON number for a token quantity, e.g. `180.909`.
fn quantity_value(amount: Amount) -> Value {
    let wire = amount.to_wire();
    wire.parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or(Value::String(wire))
}

pub struct SettlementPipeline<W, A, I> {
    writer: W,
    sidechain: A,
    inventory: I,
    interpreter: PaymentInterpreter,
    config: SettlementConfig,
    orders: mpsc::UnboundedSender<ReplenishmentOrder>,
    journal: Option<SharedJournal>,
}

impl<W: LedgerWriter, A: SidechainApi, I: InventoryApi> SettlementPipeline<W, A, I> {
    pub fn new(
        writer: W,
        sidechain: A,
        inventory: I,
        config: SettlementConfig,
        orders: mpsc::UnboundedSender<ReplenishmentOrder>,
    ) -> Self {
        Self {
            writer,
            sidechain,
            inventory,
            interpreter: PaymentInterpreter::new(config.clone()),
            config,
            orders,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: SharedJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Settle one transfer. Never fails; every path ends in an outcome.
    pub async fn settle(&self, transfer: &TransferOp, ctx: &OperationContext) -> SettlementOutcome {
        let instruction = match self.interpreter.interpret(transfer) {
            Ok(instruction) => instruction,
            Err(rejection) => {
                if rejection != Rejection::NotForAccount {
                    debug!(
                        trx_id = %ctx.trx_id,
                        from = %transfer.from,
                        reason = %rejection,
                        "Ignoring payment"
                    );
                    Metrics::settlement("ignored");
                }
                return SettlementOutcome::Ignored { rejection };
            }
        };

        info!(
            trx_id = %ctx.trx_id,
            block = ctx.block_num,
            from = %instruction.payer,
            amount = %instruction.raw_amount,
            symbol = %instruction.symbol,
            recipient = %instruction.recipient,
            "Incoming payment"
        );

        let outcome = self.execute(&instruction, ctx).await;

        Metrics::settlement(outcome.label());
        journal::record(self.journal.as_ref(), "settlement", &ctx.trx_id, &outcome);
        outcome
    }

    async fn execute(
        &self,
        instruction: &PurchaseInstruction,
        ctx: &OperationContext,
    ) -> SettlementOutcome {
        let symbol = &instruction.symbol;
        let paid = instruction.payment.amount;
        let unavailable = format!("Not enough {symbol} available for purchase. Refunding payment.");
        let incomplete = format!("Unable to complete {symbol} purchase. Refunding payment.");

        // Always a fresh snapshot; pool state moves between payments
        let pair = self.config.pool_pair(symbol);
        let pool = match self.sidechain.pool(&pair).await {
            Ok(Some(pool)) => pool,
            Ok(None) => {
                let reason = format!("Pool {pair} not found");
                return self
                    .refund_payment(instruction, &instruction.payment, ctx, reason, unavailable)
                    .await;
            }
            Err(e) => {
                let reason = format!("Pool {pair} lookup failed: {e}");
                return self
                    .refund_payment(instruction, &instruction.payment, ctx, reason, incomplete)
                    .await;
            }
        };
        let Some(conversion) =
            quote_from_base_capped(&pool, paid, self.config.max_pool_share_bps)
        else {
            let reason = format!("Pool {pair} cannot convert {paid}");
            return self
                .refund_payment(instruction, &instruction.payment, ctx, reason, unavailable)
                .await;
        };

        // What the payer is still owed if the purchase stops here
        let mut outstanding = instruction.payment.clone();
        let shortfall = conversion.shortfall(paid).round_token();
        let partial_refund = if shortfall.is_positive() {
            let amount = AssetAmount::new(shortfall, &self.config.base_currency);
            let memo = format!(
                "Not enough {symbol} available for purchase. Refunding remaining {}.",
                self.config.base_currency
            );
            warn!(trx_id = %ctx.trx_id, refund = %amount, "Payment partially unfilled");
            if self.refund(&instruction.payer, &amount, &memo).await.is_some() {
                outstanding.amount = conversion.consumed;
            }
            Some(shortfall)
        } else {
            None
        };

        let net = apply_fee(conversion.output, self.config.fee_bps);

        let balance = match self.inventory.balance(symbol).await {
            Ok(balance) => balance,
            Err(e) => {
                let reason = format!("{symbol} inventory lookup failed: {e}");
                return self
                    .refund_payment(instruction, &outstanding, ctx, reason, incomplete)
                    .await;
            }
        };
        debug!(symbol = %symbol, balance = %balance, "Inventory balance");

        if balance < net {
            let memo = format!("Insufficient {symbol} balance. Refunding payment.");
            let reason = format!("Insufficient {symbol} inventory: {balance} < {net}");
            return self
                .refund_payment(instruction, &outstanding, ctx, reason, memo)
                .await;
        }

        let payload = json!({
            "to": instruction.recipient,
            "qty": quantity_value(net),
            "token": symbol,
        });
        let credit = match self
            .writer
            .custom_json(&self.config.credit_id(), &payload, true)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                let reason = format!("Credit of {net} {symbol} failed: {e}");
                return self
                    .refund_payment(instruction, &outstanding, ctx, reason, incomplete)
                    .await;
            }
        };
        info!(
            trx_id = %ctx.trx_id,
            recipient = %instruction.recipient,
            net = %net.to_wire(),
            symbol = %symbol,
            credit_tx_id = %credit.id,
            "Buyer credited"
        );

        let order = ReplenishmentOrder {
            source_tx_id: ctx.trx_id.clone(),
            block_num: ctx.block_num,
            symbol: symbol.clone(),
            payment: conversion.consumed,
            net,
        };
        if let Err(e) = self.orders.send(order) {
            error!(trx_id = %ctx.trx_id, error = %e, "Replenishment worker is gone, order dropped");
        }

        SettlementOutcome::Credited {
            payer: instruction.payer.clone(),
            recipient: instruction.recipient.clone(),
            symbol: symbol.clone(),
            paid,
            net,
            partial_refund,
            credit_tx_id: credit.id,
        }
    }

    /// Give back what the payer is still owed and end the purchase.
    async fn refund_payment(
        &self,
        instruction: &PurchaseInstruction,
        amount: &AssetAmount,
        ctx: &OperationContext,
        reason: String,
        memo: String,
    ) -> SettlementOutcome {
        warn!(trx_id = %ctx.trx_id, reason = %reason, refund = %amount, "Refunding payment");

        match self.refund(&instruction.payer, amount, &memo).await {
            Some(refund_tx_id) => SettlementOutcome::Refunded {
                payer: instruction.payer.clone(),
                symbol: instruction.symbol.clone(),
                amount: amount.to_wire(),
                reason,
                refund_tx_id,
            },
            None => {
                error!(trx_id = %ctx.trx_id, reason = %reason, "Settlement failed, payment kept");
                SettlementOutcome::Failed {
                    payer: instruction.payer.clone(),
                    reason: format!("{reason}; refund of {amount} failed"),
                }
            }
        }
    }

    /// Send funds back. Failures are logged and reported as `None`.
    async fn refund(&self, to: &str, amount: &AssetAmount, memo: &str) -> Option<String> {
        match self.writer.transfer(to, amount, memo).await {
            Ok(receipt) => {
                info!(to, amount = %amount, tx_id = %receipt.id, "Refund sent");
                Some(receipt.id)
            }
            Err(e) => {
                error!(to, amount = %amount, error = %e, "Refund failed");
                None
            }
        }
    }
}

impl<W: LedgerWriter, A: SidechainApi, I: InventoryApi> OperationHandler
    for SettlementPipeline<W, A, I>
{
    fn handle<'a>(&'a self, op: &'a Operation, ctx: &'a OperationContext) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(transfer) = op.as_transfer() {
                self.settle(&transfer, ctx).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, MockInventory, MockSidechain, MockWriter};
    use dmm_persistence::SettlementJournal;
    use dmm_sidechain::PoolSnapshot;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestPipeline = SettlementPipeline<Arc<MockWriter>, Arc<MockSidechain>, Arc<MockInventory>>;

    struct Harness {
        pipeline: TestPipeline,
        writer: Arc<MockWriter>,
        sidechain: Arc<MockSidechain>,
        orders: mpsc::UnboundedReceiver<ReplenishmentOrder>,
    }

    fn harness(inventory: MockInventory) -> Harness {
        harness_with(SettlementConfig::new("mm"), inventory)
    }

    fn harness_with(config: SettlementConfig, inventory: MockInventory) -> Harness {
        let writer = Arc::new(MockWriter::default());
        let sidechain = Arc::new(MockSidechain::with_pool(PoolSnapshot::new(
            Amount::new(dec!(1000)),
            Amount::new(dec!(2000)),
        )));
        let (tx, orders) = mpsc::unbounded_channel();
        let pipeline = SettlementPipeline::new(
            writer.clone(),
            sidechain.clone(),
            Arc::new(inventory),
            config,
            tx,
        );
        Harness {
            pipeline,
            writer,
            sidechain,
            orders,
        }
    }

    fn payment(amount: &str, memo: &str) -> TransferOp {
        TransferOp {
            from: "alice".into(),
            to: "mm".into(),
            amount: amount.into(),
            memo: memo.into(),
        }
    }

    const BUY: &str = r#"{"method":"buy","symbol":"DEC","to":"bob"}"#;

    #[tokio::test]
    async fn test_credit_and_queue_replenishment() {
        let mut h = harness(MockInventory::new(Amount::new(dec!(10000))));

        let outcome = h
            .pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;

        assert_eq!(
            outcome,
            SettlementOutcome::Credited {
                payer: "alice".into(),
                recipient: "bob".into(),
                symbol: "DEC".into(),
                paid: Amount::new(dec!(100)),
                net: Amount::new(dec!(180.909)),
                partial_refund: None,
                credit_tx_id: "tx-1".into(),
            }
        );

        let credits = h.writer.custom_jsons.lock();
        assert_eq!(credits.len(), 1);
        let (id, payload, active) = &credits[0];
        assert_eq!(id, "sm_token_transfer");
        assert_eq!(*payload, json!({"to": "bob", "qty": 180.909, "token": "DEC"}));
        assert_eq!(payload.to_string(), r#"{"to":"bob","qty":180.909,"token":"DEC"}"#);
        assert!(*active);
        assert!(h.writer.transfers.lock().is_empty());

        let order = h.orders.try_recv().unwrap();
        assert_eq!(order.source_tx_id, "trx1");
        assert_eq!(order.payment.inner(), dec!(100));
        assert_eq!(order.net.to_wire(), "180.909");
    }

    #[tokio::test]
    async fn test_insufficient_inventory_refunds_full_payment() {
        let mut h = harness(MockInventory::new(Amount::new(dec!(50))));

        let outcome = h
            .pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;

        assert!(matches!(
            outcome,
            SettlementOutcome::Refunded { ref amount, ref refund_tx_id, .. }
                if amount == "100.000 HIVE" && refund_tx_id == "tx-1"
        ));
        assert_eq!(
            *h.writer.transfers.lock(),
            vec![(
                "alice".to_string(),
                "100.000 HIVE".to_string(),
                "Insufficient DEC balance. Refunding payment.".to_string()
            )]
        );
        assert!(h.writer.custom_jsons.lock().is_empty());
        assert!(h.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sell_memo_moves_nothing() {
        let mut h = harness(MockInventory::new(Amount::new(dec!(10000))));

        let outcome = h
            .pipeline
            .settle(
                &payment("100.000 HIVE", r#"{"method":"sell","symbol":"DEC"}"#),
                &context("trx1"),
            )
            .await;

        assert_eq!(
            outcome,
            SettlementOutcome::Ignored {
                rejection: Rejection::UnsupportedMethod("sell".into())
            }
        );
        assert!(h.writer.transfers.lock().is_empty());
        assert!(h.writer.custom_jsons.lock().is_empty());
        assert_eq!(*h.sidechain.pool_calls.lock(), 0);
        assert!(h.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pool_fetched_for_every_conversion() {
        let h = harness(MockInventory::new(Amount::new(dec!(10000))));

        h.pipeline
            .settle(&payment("1.000 HIVE", BUY), &context("trx1"))
            .await;
        h.pipeline
            .settle(&payment("2.000 HIVE", BUY), &context("trx2"))
            .await;

        assert_eq!(*h.sidechain.pool_calls.lock(), 2);
    }

    fn refunds(writer: &MockWriter) -> Vec<(String, String, String)> {
        writer.transfers.lock().clone()
    }

    #[tokio::test]
    async fn test_inventory_outage_refunds_payment() {
        let mut h = harness(MockInventory::unavailable());

        let outcome = h
            .pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;

        assert_eq!(outcome.label(), "refunded");
        assert_eq!(
            refunds(&h.writer),
            vec![(
                "alice".to_string(),
                "100.000 HIVE".to_string(),
                "Unable to complete DEC purchase. Refunding payment.".to_string()
            )]
        );
        assert!(h.writer.custom_jsons.lock().is_empty());
        assert!(h.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_pool_refunds_payment() {
        let mut h = harness(MockInventory::new(Amount::new(dec!(10000))));
        *h.sidechain.pool.lock() = None;

        let outcome = h
            .pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;

        match outcome {
            SettlementOutcome::Refunded { reason, refund_tx_id, .. } => {
                assert!(reason.contains("SWAP.HIVE:DEC"));
                assert_eq!(refund_tx_id, "tx-1");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            refunds(&h.writer)[0].2,
            "Not enough DEC available for purchase. Refunding payment."
        );
        assert!(h.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_credit_refunds_and_queues_nothing() {
        let mut h = harness(MockInventory::new(Amount::new(dec!(10000))));
        *h.writer.fail_custom_json.lock() = true;

        let outcome = h
            .pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;

        assert_eq!(outcome.label(), "refunded");
        assert_eq!(refunds(&h.writer)[0].1, "100.000 HIVE");
        assert!(h.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_refund_is_reported() {
        let mut h = harness(MockInventory::unavailable());
        *h.writer.fail_transfers.lock() = true;

        let outcome = h
            .pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;

        match outcome {
            SettlementOutcome::Failed { payer, reason } => {
                assert_eq!(payer, "alice");
                assert!(reason.contains("refund of 100.000 HIVE failed"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(h.orders.try_recv().is_err());
    }

    fn capped_config() -> SettlementConfig {
        let mut config = SettlementConfig::new("mm");
        // 5% of the 2000 token reserve
        config.max_pool_share_bps = 500;
        config
    }

    #[tokio::test]
    async fn test_unfilled_part_is_refunded_before_credit() {
        let mut h = harness_with(capped_config(), MockInventory::new(Amount::new(dec!(10000))));

        let outcome = h
            .pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;

        assert_eq!(
            outcome,
            SettlementOutcome::Credited {
                payer: "alice".into(),
                recipient: "bob".into(),
                symbol: "DEC".into(),
                paid: Amount::new(dec!(100)),
                net: Amount::new(dec!(99.498)),
                partial_refund: Some(Amount::new(dec!(47.369))),
                credit_tx_id: "tx-2".into(),
            }
        );
        assert_eq!(
            refunds(&h.writer),
            vec![(
                "alice".to_string(),
                "47.369 HIVE".to_string(),
                "Not enough DEC available for purchase. Refunding remaining HIVE.".to_string()
            )]
        );
        assert_eq!(h.writer.custom_jsons.lock()[0].1["qty"], json!(99.498));

        // Only the consumed part is swapped back
        let order = h.orders.try_recv().unwrap();
        assert_eq!(order.payment.to_wire(), "52.631");
        assert_eq!(order.net.to_wire(), "99.498");
    }

    #[tokio::test]
    async fn test_refund_after_partial_refund_covers_the_rest() {
        let mut h = harness_with(capped_config(), MockInventory::new(Amount::new(dec!(50))));

        let outcome = h
            .pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;

        assert_eq!(outcome.label(), "refunded");
        let sent: Vec<String> = refunds(&h.writer).into_iter().map(|(_, amount, _)| amount).collect();
        assert_eq!(sent, vec!["47.369 HIVE".to_string(), "52.631 HIVE".to_string()]);
        assert!(h.writer.custom_jsons.lock().is_empty());
        assert!(h.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_only_settles_transfers() {
        let h = harness(MockInventory::new(Amount::new(dec!(10000))));
        let vote = Operation::new("vote", json!({"voter": "alice", "author": "mm"}));
        let transfer = Operation::new(
            "transfer",
            json!({"from": "alice", "to": "mm", "amount": "1.000 HIVE", "memo": BUY}),
        );

        h.pipeline.handle(&vote, &context("trx1")).await;
        assert_eq!(*h.sidechain.pool_calls.lock(), 0);

        h.pipeline.handle(&transfer, &context("trx2")).await;
        assert_eq!(h.writer.custom_jsons.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_outcomes_are_journaled() {
        let dir = TempDir::new().unwrap();
        let journal = Arc::new(Mutex::new(SettlementJournal::new(dir.path())));
        let mut h = harness(MockInventory::new(Amount::new(dec!(10000))));
        h.pipeline = h.pipeline.with_journal(journal);

        h.pipeline
            .settle(&payment("100.000 HIVE", BUY), &context("trx1"))
            .await;
        h.pipeline
            .settle(&payment("1.000 HIVE", "not a purchase"), &context("trx2"))
            .await;

        let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let contents = std::fs::read_to_string(entry.path()).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        // Ignored payments are not journaled
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["kind"], "settlement");
        assert_eq!(lines[0]["source_tx_id"], "trx1");
        assert_eq!(lines[0]["outcome"], "credited");
        assert_eq!(lines[0]["net"], "180.909");
    }
}
