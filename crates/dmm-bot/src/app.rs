//! Main application orchestration.
//!
//! Coordinates all components:
//! - Ledger follower with file checkpoint
//! - Settlement pipeline (credit or refund per payment)
//! - Replenishment worker fed by the pipeline
//! - Quote API server

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::quote::{self, QuoteState};
use axum::Router;
use dmm_core::SystemClock;
use dmm_follower::Follower;
use dmm_persistence::{FileCheckpointStore, SettlementJournal};
use dmm_rpc::{Broadcaster, FailoverClient, HttpTransport, RemoteSigner};
use dmm_settlement::{
    GameApiClient, Replenisher, ReplenishmentOrder, SettlementPipeline, SharedJournal,
};
use dmm_sidechain::SidechainClient;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

type Writer = Arc<Broadcaster<HttpTransport, SystemClock, RemoteSigner>>;
type Sidechain = Arc<SidechainClient>;
type Pipeline = SettlementPipeline<Writer, Sidechain, GameApiClient>;
type LedgerFollower = Follower<Arc<FailoverClient<HttpTransport>>, FileCheckpointStore, Pipeline>;

/// Main application.
pub struct Application {
    config: AppConfig,
    follower: LedgerFollower,
    replenisher: Replenisher<Writer, Sidechain>,
    orders: mpsc::UnboundedReceiver<ReplenishmentOrder>,
    quote_api: Option<(SocketAddr, Router)>,
}

impl Application {
    /// Wire every component from configuration. No network I/O happens here.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let transport = HttpTransport::new(config.failover.request_timeout())?;
        let node = Arc::new(FailoverClient::new(
            transport,
            config.nodes.iter().cloned(),
            config.failover.clone(),
        ));

        let token = config.signer_token();
        if token.is_none() {
            warn!(
                env = %config.signer.auth_token_env,
                "Signer token not set, signing requests are unauthenticated"
            );
        }
        let signer = RemoteSigner::new(config.signer.url.clone(), token, config.signer.timeout())?;
        let writer: Writer = Arc::new(Broadcaster::new(
            Arc::clone(&node),
            signer,
            config.settlement.account.clone(),
            config.broadcast.clone(),
        ));

        let sidechain: Sidechain = Arc::new(SidechainClient::new(config.sidechain.rpc_url.clone())?);
        let inventory =
            GameApiClient::new(config.game_api.url.clone(), config.settlement.account.clone())?;

        let journal: SharedJournal = Arc::new(Mutex::new(SettlementJournal::new(
            &config.persistence.data_dir,
        )));

        let (orders_tx, orders) = mpsc::unbounded_channel();
        let pipeline = SettlementPipeline::new(
            Arc::clone(&writer),
            Arc::clone(&sidechain),
            inventory,
            config.settlement.clone(),
            orders_tx,
        )
        .with_journal(Arc::clone(&journal));

        let replenisher = Replenisher::new(
            writer,
            Arc::clone(&sidechain),
            &config.settlement,
            config.sidechain.clone(),
            config.replenish.clone(),
        )
        .with_journal(journal);

        let store = FileCheckpointStore::new(&config.persistence.state_file);
        let follower = Follower::new(node, store, pipeline, config.follower.clone());

        let quote_api = if config.api.enabled {
            let addr = config.api.socket_addr()?;
            let state = QuoteState::new(sidechain, config.settlement.clone(), config.api.clone());
            Some((addr, quote::create_router(Arc::new(state))))
        } else {
            None
        };

        Ok(Self {
            config,
            follower,
            replenisher,
            orders,
            quote_api,
        })
    }

    /// Run until Ctrl-C, then drain queued replenishments.
    ///
    /// Only an unreadable checkpoint stops startup. Node failures, including
    /// at startup, are logged and retried on the next poll.
    pub async fn run(self) -> AppResult<()> {
        let Self {
            config,
            mut follower,
            replenisher,
            orders,
            quote_api,
        } = self;

        let last = follower.restore()?;
        info!(
            account = %config.settlement.account,
            nodes = config.nodes.len(),
            ?last,
            "Starting application"
        );

        let replenish_handle = tokio::spawn(replenisher.run(orders));

        if let Some((addr, router)) = quote_api {
            tokio::spawn(async move {
                if let Err(e) = quote::run_server(addr, router).await {
                    error!(error = %e, "Quote API server failed");
                }
            });
        }

        tokio::select! {
            _ = follower.run() => {}
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown requested");
            }
        }

        // The follower (and with it the order sender) is dropped at this
        // point, so the worker exits once its queue is empty.
        info!("Waiting for queued replenishments");
        tokio::select! {
            _ = replenish_handle => info!("Replenishment queue drained"),
            _ = tokio::signal::ctrl_c() => warn!("Replenishment drain interrupted"),
        }

        Ok(())
    }
}
