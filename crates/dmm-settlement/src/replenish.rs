//! Inventory replenishment.
//!
//! After a buyer has been credited, the base currency they paid is swapped
//! back into the token on the sidechain:
//!
//! deposit → confirm → market buy → confirm → transfer to holding → confirm
//!
//! Each step waits for sidechain confirmation before the next one starts.
//! A failure aborts the remaining steps and is reported; the buyer's credit
//! is never reversed. Orders are processed one at a time by a single worker.

use crate::config::{ReplenishConfig, SettlementConfig, SidechainSettings};
use crate::journal::{self, SharedJournal};
use dmm_core::{Amount, AssetAmount, Price};
use dmm_rpc::LedgerWriter;
use dmm_sidechain::{Confirmation, ConfirmationPoller, SidechainApi, SidechainTx};
use dmm_telemetry::Metrics;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Work handed from the settlement pipeline to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplenishmentOrder {
    pub source_tx_id: String,
    pub block_num: u64,
    pub symbol: String,
    /// Base currency received from the buyer.
    pub payment: Amount,
    /// Tokens credited to the buyer, and therefore to buy back.
    pub net: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplenishStep {
    Deposit,
    DepositConfirm,
    MarketBuy,
    MarketBuyConfirm,
    Transfer,
    TransferConfirm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplenishmentOutcome {
    Completed {
        symbol: String,
        deposited: Amount,
        bought: Amount,
        transfer_tx_id: String,
    },
    Aborted {
        step: ReplenishStep,
        reason: String,
    },
}

impl ReplenishmentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReplenishmentOutcome::Completed { .. } => "completed",
            ReplenishmentOutcome::Aborted { .. } => "aborted",
        }
    }
}

type StepResult<T> = Result<T, (ReplenishStep, String)>;

pub struct Replenisher<W, A> {
    writer: W,
    sidechain: A,
    poller: ConfirmationPoller,
    account: String,
    base_currency: String,
    settings: SidechainSettings,
    config: ReplenishConfig,
    journal: Option<SharedJournal>,
}

impl<W: LedgerWriter, A: SidechainApi> Replenisher<W, A> {
    pub fn new(
        writer: W,
        sidechain: A,
        settlement: &SettlementConfig,
        settings: SidechainSettings,
        config: ReplenishConfig,
    ) -> Self {
        Self {
            writer,
            sidechain,
            poller: ConfirmationPoller::new(config.confirm.clone()),
            account: settlement.account.clone(),
            base_currency: settlement.base_currency.clone(),
            settings,
            config,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: SharedJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Process orders until every sender is dropped.
    pub async fn run(self, mut orders: mpsc::UnboundedReceiver<ReplenishmentOrder>) {
        info!("Replenishment worker started");
        while let Some(order) = orders.recv().await {
            self.replenish(&order).await;
        }
        info!("Replenishment worker stopped");
    }

    /// Run the full sub-flow for one order.
    pub async fn replenish(&self, order: &ReplenishmentOrder) -> ReplenishmentOutcome {
        let outcome = match self.execute(order).await {
            Ok(outcome) => outcome,
            Err((step, reason)) => ReplenishmentOutcome::Aborted { step, reason },
        };

        match &outcome {
            ReplenishmentOutcome::Completed { bought, .. } => info!(
                source_tx_id = %order.source_tx_id,
                symbol = %order.symbol,
                bought = %bought,
                "Replenishment completed"
            ),
            ReplenishmentOutcome::Aborted { step, reason } => error!(
                source_tx_id = %order.source_tx_id,
                ?step,
                reason = %reason,
                "Replenishment aborted"
            ),
        }

        Metrics::replenishment(outcome.label());
        journal::record(self.journal.as_ref(), "replenishment", &order.source_tx_id, &outcome);
        outcome
    }

    async fn execute(&self, order: &ReplenishmentOrder) -> StepResult<ReplenishmentOutcome> {
        // Peg the payment onto the sidechain
        let payment = AssetAmount::new(order.payment, &self.base_currency);
        let deposit = self
            .writer
            .transfer(&self.settings.deposit_account, &payment, &self.deposit_memo())
            .await
            .map_err(|e| (ReplenishStep::Deposit, format!("Deposit of {payment} failed: {e}")))?;

        let deposit_tx = self.confirm(ReplenishStep::DepositConfirm, &deposit.id).await?;
        let deposited = deposit_tx
            .logs
            .credits_to(&self.account)
            .find_map(|e| e.data.quantity)
            .ok_or_else(|| {
                (
                    ReplenishStep::DepositConfirm,
                    format!("Deposit {} credited nothing to {}", deposit.id, self.account),
                )
            })?;

        let delay = self.pre_swap_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // Buy back what was credited
        let price = Price::per_unit(deposited, order.net).ok_or_else(|| {
            (ReplenishStep::MarketBuy, format!("Cannot price a buy of {}", order.net))
        })?;
        let buy = self
            .sidechain_action(
                "market",
                "buy",
                json!({
                    "symbol": order.symbol,
                    "quantity": order.net.to_wire(),
                    "price": price.to_wire(),
                }),
            )
            .await
            .map_err(|e| {
                (
                    ReplenishStep::MarketBuy,
                    format!("Market buy of {} {} failed: {e}", order.net.to_wire(), order.symbol),
                )
            })?;

        let buy_tx = self.confirm(ReplenishStep::MarketBuyConfirm, &buy.id).await?;
        let bought = buy_tx.logs.total_credited(&self.account);
        if !bought.is_positive() {
            return Err((
                ReplenishStep::MarketBuyConfirm,
                format!("Market buy {} filled nothing", buy.id),
            ));
        }

        // Forward the bought tokens
        let transfer = self
            .sidechain_action(
                "tokens",
                "transfer",
                json!({
                    "symbol": order.symbol,
                    "quantity": bought.to_wire(),
                    "to": self.settings.holding_account,
                }),
            )
            .await
            .map_err(|e| {
                (
                    ReplenishStep::Transfer,
                    format!(
                        "Transfer of {} {} to @{} failed: {e}",
                        bought.to_wire(),
                        order.symbol,
                        self.settings.holding_account
                    ),
                )
            })?;

        self.confirm(ReplenishStep::TransferConfirm, &transfer.id).await?;

        Ok(ReplenishmentOutcome::Completed {
            symbol: order.symbol.clone(),
            deposited,
            bought,
            transfer_tx_id: transfer.id,
        })
    }

    fn deposit_memo(&self) -> String {
        json!({
            "id": self.settings.chain_id,
            "json": {
                "contractName": "hivepegged",
                "contractAction": "buy",
                "contractPayload": {},
            },
        })
        .to_string()
    }

    async fn sidechain_action(
        &self,
        contract: &str,
        action: &str,
        payload: Value,
    ) -> dmm_rpc::RpcResult<dmm_rpc::TxReceipt> {
        let body = json!({
            "contractName": contract,
            "contractAction": action,
            "contractPayload": payload,
        });
        self.writer
            .custom_json(&self.settings.chain_id, &body, true)
            .await
    }

    async fn confirm(&self, step: ReplenishStep, tx_id: &str) -> StepResult<SidechainTx> {
        match self.poller.confirm(&self.sidechain, tx_id).await {
            Confirmation::Confirmed(tx) => Ok(tx),
            other => {
                let reason = other.failure_reason().unwrap_or_default();
                warn!(tx_id, ?step, reason = %reason, "Sidechain transaction not confirmed");
                Err((step, format!("{tx_id}: {reason}")))
            }
        }
    }

    fn pre_swap_delay(&self) -> Duration {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
