use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context};
use serde::Deserialize;

use crate::engine::{validate_tick_size, DEFAULT_TICK_SIZE};
use crate::market_data::adapters::polymarket::DEFAULT_WS_URL;

const DEFAULT_REPORT_INTERVAL_MS: u64 = 1_000;
const DEFAULT_CHANNEL_CAPACITY: u64 = 1_000;
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9000";

/// Runtime settings: built-in defaults, then `predbook.toml` (or `--config`),
/// then `PREDBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub default_tick_size: f64,
    pub report_interval_ms: u64,
    pub channel_capacity: usize,
    pub log_filter: String,
    pub polymarket_ws_url: String,
    pub metrics_addr: SocketAddr,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_tick_size: DEFAULT_TICK_SIZE,
            report_interval_ms: DEFAULT_REPORT_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY as usize,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            polymarket_ws_url: DEFAULT_WS_URL.to_string(),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("predbook").required(false),
        };
        let settings: Settings = config::Config::builder()
            .set_default("default_tick_size", DEFAULT_TICK_SIZE)?
            .set_default("report_interval_ms", DEFAULT_REPORT_INTERVAL_MS)?
            .set_default("channel_capacity", DEFAULT_CHANNEL_CAPACITY)?
            .set_default("log_filter", DEFAULT_LOG_FILTER)?
            .set_default("polymarket_ws_url", DEFAULT_WS_URL)?
            .set_default("metrics_addr", DEFAULT_METRICS_ADDR)?
            .add_source(file)
            .add_source(config::Environment::with_prefix("PREDBOOK").try_parsing(true))
            .build()
            .context("reading settings")?
            .try_deserialize()
            .context("decoding settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_tick_size(self.default_tick_size).context("default_tick_size")?;
        ensure!(self.report_interval_ms > 0, "report_interval_ms must be positive");
        ensure!(self.channel_capacity > 0, "channel_capacity must be positive");
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
