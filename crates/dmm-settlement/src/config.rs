//! Settlement configuration.

use dmm_sidechain::ConfirmConfig;
use serde::{Deserialize, Serialize};

/// Identity and pricing policy of the market maker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Service account that receives payments and signs outgoing operations.
    pub account: String,
    /// Base currency accepted as payment. Default: "HIVE".
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    /// Pegged-debt currency, always rejected. Default: "HBD".
    #[serde(default = "default_debt_currency")]
    pub debt_currency: String,
    /// Tokens that can be bought. Default: ["DEC"].
    #[serde(default = "default_supported_tokens")]
    pub supported_tokens: Vec<String>,
    /// Conversion fee (bps). Default: 50 (0.5%).
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
    /// Prefix of the credit `custom_json` id. Default: "sm_".
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Wrapped base symbol on the sidechain pool pair. Default: "SWAP.HIVE".
    #[serde(default = "default_pool_base_symbol")]
    pub pool_base_symbol: String,
    /// Largest share of the pool's token reserve one payment may buy (bps).
    /// The unused part of a larger payment is refunded. Default: 10,000 (no cap).
    #[serde(default = "default_max_pool_share_bps")]
    pub max_pool_share_bps: u32,
}

fn default_base_currency() -> String {
    "HIVE".to_string()
}

fn default_debt_currency() -> String {
    "HBD".to_string()
}

fn default_supported_tokens() -> Vec<String> {
    vec!["DEC".to_string()]
}

fn default_fee_bps() -> u32 {
    50
}

fn default_prefix() -> String {
    "sm_".to_string()
}

fn default_pool_base_symbol() -> String {
    "SWAP.HIVE".to_string()
}

fn default_max_pool_share_bps() -> u32 {
    10_000
}

impl SettlementConfig {
    /// Config with defaults for everything but the account.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            base_currency: default_base_currency(),
            debt_currency: default_debt_currency(),
            supported_tokens: default_supported_tokens(),
            fee_bps: default_fee_bps(),
            prefix: default_prefix(),
            pool_base_symbol: default_pool_base_symbol(),
            max_pool_share_bps: default_max_pool_share_bps(),
        }
    }

    pub fn is_supported(&self, symbol: &str) -> bool {
        self.supported_tokens.iter().any(|t| t == symbol)
    }

    /// Pool key for `symbol`, e.g. `"SWAP.HIVE:DEC"`.
    pub fn pool_pair(&self, symbol: &str) -> String {
        format!("{}:{symbol}", self.pool_base_symbol)
    }

    /// `custom_json` id of the off-chain credit instruction.
    pub fn credit_id(&self) -> String {
        format!("{}token_transfer", self.prefix)
    }
}

/// Sidechain accounts and chain id used for replenishment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidechainSettings {
    /// Sidechain RPC base URL. Default: "https://api.hive-engine.com/rpc".
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Sidechain id used in `custom_json` operations. Default: "ssc-mainnet-hive".
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Account that pegs base currency onto the sidechain. Default: "honey-swap".
    #[serde(default = "default_deposit_account")]
    pub deposit_account: String,
    /// Account bought tokens are forwarded to.
    pub holding_account: String,
}

fn default_rpc_url() -> String {
    "https://api.hive-engine.com/rpc".to_string()
}

fn default_chain_id() -> String {
    "ssc-mainnet-hive".to_string()
}

fn default_deposit_account() -> String {
    "honey-swap".to_string()
}

impl SidechainSettings {
    pub fn new(holding_account: impl Into<String>) -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            deposit_account: default_deposit_account(),
            holding_account: holding_account.into(),
        }
    }
}

/// Replenishment worker timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplenishConfig {
    /// Lower bound of the randomized pre-swap delay (ms). Default: 0.
    #[serde(default)]
    pub min_delay_ms: u64,
    /// Upper bound of the randomized pre-swap delay (ms). Default: 0.
    #[serde(default)]
    pub max_delay_ms: u64,
    /// Sidechain confirmation polling.
    #[serde(default)]
    pub confirm: ConfirmConfig,
}
