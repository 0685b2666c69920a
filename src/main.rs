use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use predbook_rs::config::Settings;
use predbook_rs::engine::BookRegistry;
use predbook_rs::market_data::adapters::polymarket::PolymarketAdapter;
use predbook_rs::market_data::adapters::VenueAdapter;
use predbook_rs::market_data::router;
use predbook_rs::telemetry;

/// Aggregate prediction-market order books from venue feeds.
#[derive(Debug, Parser)]
#[command(name = "predbook", version)]
struct Cli {
    /// Polymarket asset (outcome token) ids to subscribe to
    #[arg(long = "poly", value_name = "ASSET_ID", num_args = 1..)]
    poly: Vec<String>,

    /// Settings file; defaults to ./predbook.toml when present
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tick size for newly registered books
    #[arg(long, value_name = "T")]
    tick_size: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(tick_size) = cli.tick_size {
        settings.default_tick_size = tick_size;
        settings.validate()?;
    }

    telemetry::init_tracing(&settings.log_filter);
    telemetry::init_metrics(settings.metrics_addr)?;

    if cli.poly.is_empty() {
        bail!("nothing to subscribe to; pass at least one --poly <ASSET_ID>");
    }

    let registry = Arc::new(BookRegistry::new(settings.default_tick_size).context("building registry")?);
    let adapters: Vec<Box<dyn VenueAdapter>> =
        vec![Box::new(PolymarketAdapter::new(cli.poly, settings.polymarket_ws_url.clone()))];

    tracing::info!(tick_size = registry.default_tick_size(), "predbook starting");
    router::run(registry, adapters, &settings).await
}
