//! One-shot weekly activity estimate.
//!
//! Usage:
//!   cargo run                       # traders from tradecap.toml or defaults
//!   cargo run -- 0xabc... 0xdef...  # analyze these addresses instead

use chrono::Utc;
use std::path::Path;
use tracing::info;

use tradecap::activity::{collect_trades, DataApiClient};
use tradecap::config::Config;
use tradecap::replay::ReplayEngine;
use tradecap::report;

const CONFIG_PATH: &str = "tradecap.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = if Path::new(CONFIG_PATH).exists() {
        Config::load(Path::new(CONFIG_PATH))?
    } else {
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("tradecap v{} starting", env!("CARGO_PKG_VERSION"));

    let policy = config.simulation.cap_policy()?;

    let cli_traders: Vec<String> = std::env::args().skip(1).collect();
    let traders = if cli_traders.is_empty() {
        config.traders.clone()
    } else {
        cli_traders
    };

    println!("Fetching trade history for analysis...");
    info!(
        traders = traders.len(),
        url = %config.data_api.url,
        limit = config.data_api.limit,
        "fetching activity"
    );

    let source = DataApiClient::new(&config.data_api)?;
    let trades = collect_trades(&source, &traders).await;

    let replay = ReplayEngine::new(policy).run(&trades, Utc::now());
    print!("{}", report::render(&replay, traders.len()));

    Ok(())
}
