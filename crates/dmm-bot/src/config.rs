//! Application configuration.

use crate::error::{AppError, AppResult};
use dmm_follower::FollowerConfig;
use dmm_rpc::{BroadcastConfig, FailoverConfig};
use dmm_settlement::{ReplenishConfig, SettlementConfig, SidechainSettings};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Remote signing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Signing endpoint URL.
    pub url: String,
    /// Environment variable holding the bearer token. Default: "DMM_SIGNER_TOKEN".
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
    /// Request timeout (ms). Default: 10,000.
    #[serde(default = "default_signer_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_auth_token_env() -> String {
    "DMM_SIGNER_TOKEN".to_string()
}

fn default_signer_timeout_ms() -> u64 {
    10_000
}

impl SignerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Off-chain game API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameApiConfig {
    /// Base URL. Default: "https://api2.splinterlands.com".
    #[serde(default = "default_game_api_url")]
    pub url: String,
}

fn default_game_api_url() -> String {
    "https://api2.splinterlands.com".to_string()
}

impl Default for GameApiConfig {
    fn default() -> Self {
        Self {
            url: default_game_api_url(),
        }
    }
}

/// On-disk state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Checkpoint file. Default: "state.json".
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Directory for the settlement journal. Default: "data".
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_state_file() -> String {
    "state.json".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            data_dir: default_data_dir(),
        }
    }
}

/// Quote API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable the quote API. Default: true.
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    /// Bind address. Default: "0.0.0.0".
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on. Default: 3000.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pool snapshot cache lifetime (ms). Default: 10,000.
    #[serde(default = "default_pool_cache_ttl_ms")]
    pub pool_cache_ttl_ms: u64,
    /// Sell book cache lifetime (ms). Default: 60,000.
    #[serde(default = "default_sell_book_cache_ttl_ms")]
    pub sell_book_cache_ttl_ms: u64,
    /// Orders fetched per sell book lookup. Default: 200.
    #[serde(default = "default_sell_book_limit")]
    pub sell_book_limit: u32,
}

fn default_api_enabled() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_pool_cache_ttl_ms() -> u64 {
    10_000
}

fn default_sell_book_cache_ttl_ms() -> u64 {
    60_000
}

fn default_sell_book_limit() -> u32 {
    200
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            bind: default_bind(),
            port: default_port(),
            pool_cache_ttl_ms: default_pool_cache_ttl_ms(),
            sell_book_cache_ttl_ms: default_sell_book_cache_ttl_ms(),
            sell_book_limit: default_sell_book_limit(),
        }
    }
}

impl ApiConfig {
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid api.bind {:?}: {e}", self.bind)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ledger node endpoints, in priority order.
    pub nodes: Vec<String>,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    pub signer: SignerConfig,
    pub settlement: SettlementConfig,
    pub sidechain: SidechainSettings,
    #[serde(default)]
    pub replenish: ReplenishConfig,
    #[serde(default)]
    pub follower: FollowerConfig,
    #[serde(default)]
    pub game_api: GameApiConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.nodes.is_empty() {
            return Err(AppError::Config("nodes must not be empty".into()));
        }
        if self.failover.error_limit == 0 {
            return Err(AppError::Config("failover.error_limit must be at least 1".into()));
        }
        if self.settlement.account.is_empty() {
            return Err(AppError::Config("settlement.account must be set".into()));
        }
        if self.settlement.supported_tokens.is_empty() {
            return Err(AppError::Config(
                "settlement.supported_tokens must not be empty".into(),
            ));
        }
        if !(1..=10_000).contains(&self.settlement.max_pool_share_bps) {
            return Err(AppError::Config(format!(
                "settlement.max_pool_share_bps must be within 1..=10000, got {}",
                self.settlement.max_pool_share_bps
            )));
        }
        if self.settlement.fee_bps >= 10_000 {
            return Err(AppError::Config(format!(
                "settlement.fee_bps must be below 10000, got {}",
                self.settlement.fee_bps
            )));
        }
        if self.sidechain.holding_account.is_empty() {
            return Err(AppError::Config("sidechain.holding_account must be set".into()));
        }
        if self.replenish.min_delay_ms > self.replenish.max_delay_ms {
            return Err(AppError::Config(format!(
                "replenish.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.replenish.min_delay_ms, self.replenish.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Signer bearer token from the configured environment variable.
    pub fn signer_token(&self) -> Option<String> {
        std::env::var(&self.signer.auth_token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }
}
