//! Multi-node failover JSON-RPC client for the base ledger.
//!
//! - `NodePool`: per-endpoint health with error windows and cool-downs
//! - `FailoverClient`: routes read calls across nodes, broadcasts to one
//! - `LedgerReader` / `LedgerWriter`: the ledger surface the follower and
//!   settlement pipeline depend on
//! - `Broadcaster`: signs through an external `Signer` and retries submission

pub mod broadcast;
pub mod error;
pub mod failover;
pub mod ledger;
pub mod node;
pub mod transport;

pub use broadcast::{
    Authority, BroadcastConfig, Broadcaster, LedgerWriter, RemoteSigner, Signer, TxReceipt,
};
pub use error::{RpcError, RpcResult};
pub use failover::FailoverClient;
pub use ledger::LedgerReader;
pub use node::{ErrorOutcome, FailoverConfig, NodePool, RpcNode};
pub use transport::{BoxFuture, HttpTransport, NodeTransport};
