use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

fn describe_metrics() {
    metrics::describe_counter!("predbook_level_updates_total", "Ladder levels written by venue updates");
    metrics::describe_counter!("predbook_trades_total", "Trades produced by crossing orders");
    metrics::describe_counter!("predbook_tick_size_changes_total", "Tick size changes applied to books");
    metrics::describe_counter!("predbook_feed_events_total", "Market events received per venue");
    metrics::describe_gauge!("predbook_books", "Registered order books");
    metrics::describe_gauge!("predbook_up", "Set to 1 once the exporter is listening");
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("prometheus exporter install: {e}"))?;
    describe_metrics();

    tracing::info!(%addr, "Prometheus exporter listening on /metrics");
    metrics::gauge!("predbook_up").set(1.0);
    Ok(())
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    describe_metrics();
    tracing::debug!(%addr, "Built without metrics-exporter; metrics stay in-process");
    Ok(())
}
