//! DEC market-maker settlement agent - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// DEC market-maker settlement agent
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DMM_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    dmm_telemetry::init_logging()?;

    info!("Starting DEC market maker v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > DMM_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("DMM_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = dmm_bot::AppConfig::from_file(&config_path)?;
    info!(
        account = %config.settlement.account,
        tokens = ?config.settlement.supported_tokens,
        fee_bps = config.settlement.fee_bps,
        "Configuration loaded"
    );

    let app = dmm_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
