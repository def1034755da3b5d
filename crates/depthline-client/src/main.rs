//! depthline - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Live order book depth and candle viewer.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DEPTHLINE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Exchange override (e.g. "coinbasepro")
    #[arg(short, long)]
    exchange: Option<String>,

    /// Pair override (e.g. "BTC/USD")
    #[arg(short, long)]
    pair: Option<String>,

    /// Candle timeframe override (e.g. "1h")
    #[arg(short, long)]
    timeframe: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any wss:// connection
    depthline_ws::init_crypto();

    let args = Args::parse();

    depthline_telemetry::init_logging()?;

    info!("Starting depthline v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > DEPTHLINE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("DEPTHLINE_CONFIG").ok())
        .unwrap_or_else(|| depthline_client::DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = depthline_client::AppConfig::load(&config_path)?;
    config.apply_overrides(args.exchange, args.pair, args.timeframe);
    info!(
        exchange = %config.subscription.exchange,
        pair = %config.subscription.pair,
        api_base = %config.rest.base_url,
        "Configuration loaded"
    );

    let app = depthline_client::Application::new(config)?;
    app.run().await?;

    Ok(())
}
