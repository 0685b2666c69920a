// Router wires venue adapters into the shared registry.
//
// Per adapter: one ingest task (the adapter's socket loop) and one apply task
// draining its channel. A reporter task logs top of book on an interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::engine::{BookRegistry, BookResult, LadderEntry, MarketKey};
use crate::market_data::adapters::{MarketEvent, VenueAdapter};

pub async fn apply_event(registry: &BookRegistry, event: MarketEvent) -> BookResult<()> {
    match event {
        MarketEvent::Snapshot { key, bids, offers } => {
            registry.init_order_book(key, bids, offers).await?;
        }
        MarketEvent::Levels { key, predicate, side, update, is_delta } => {
            registry.update_order_book(&key.exchange_id, &key.market_id, predicate, side, update, is_delta).await?;
        }
        MarketEvent::TickSize { key, tick_size } => {
            registry.set_tick_size(&key.exchange_id, &key.market_id, tick_size).await?;
        }
    }
    Ok(())
}

/// Drains one feed's events into the registry. Returns early on an integrity
/// violation: the feed's view of the book can no longer be trusted.
pub async fn apply_loop(
    registry: Arc<BookRegistry>,
    venue: &'static str,
    mut rx: mpsc::Receiver<MarketEvent>,
) -> BookResult<()> {
    while let Some(event) = rx.recv().await {
        metrics::counter!("predbook_feed_events_total", "venue" => venue).increment(1);
        let key = event.key().clone();
        match apply_event(&registry, event).await {
            Ok(()) => {}
            Err(e) if e.is_integrity_violation() => {
                error!(venue, market = %key, error = %e, "Integrity violation, stopping feed");
                return Err(e);
            }
            Err(e) => warn!(venue, market = %key, error = %e, "Dropped market event"),
        }
    }
    Ok(())
}

/// Spawns the ingest and apply tasks for one adapter.
pub fn spawn_feed(
    tasks: &mut JoinSet<anyhow::Result<()>>,
    registry: Arc<BookRegistry>,
    adapter: Box<dyn VenueAdapter>,
    capacity: usize,
) {
    let venue = adapter.venue();
    let (tx, rx) = mpsc::channel(capacity);
    tasks.spawn(async move { adapter.spawn(tx).await.with_context(|| format!("{venue} feed")) });
    tasks.spawn(async move { apply_loop(registry, venue, rx).await.with_context(|| format!("{venue} apply loop")) });
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopOfBook {
    pub key: MarketKey,
    pub best_bid: Option<LadderEntry>,
    pub best_offer: Option<LadderEntry>,
    pub mid_price: Option<f64>, // None while the book is one-sided
}

pub async fn top_of_book(registry: &BookRegistry) -> Vec<TopOfBook> {
    let mut rows = Vec::new();
    for key in registry.keys() {
        let Ok((best_bid, best_offer)) = registry.best(&key.exchange_id, &key.market_id).await else {
            continue;
        };
        let mid_price = registry.column(&key.exchange_id, &key.market_id).await.ok().map(|c| c.mid_price());
        rows.push(TopOfBook { key, best_bid, best_offer, mid_price });
    }
    rows
}

fn level_text(entry: Option<LadderEntry>) -> String {
    entry.map_or_else(|| "-".to_string(), |e| format!("{:.3} x {}", e.price, e.quantity))
}

async fn report_loop(registry: Arc<BookRegistry>, every: Duration) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        for row in top_of_book(&registry).await {
            let bid = level_text(row.best_bid);
            let offer = level_text(row.best_offer);
            info!(market = %row.key, %bid, %offer, mid = ?row.mid_price, "Top of book");
        }
    }
}

/// Runs every feed plus the reporter until ctrl-c.
pub async fn run(
    registry: Arc<BookRegistry>,
    adapters: Vec<Box<dyn VenueAdapter>>,
    settings: &Settings,
) -> anyhow::Result<()> {
    let mut tasks = JoinSet::new();
    for adapter in adapters {
        info!(venue = adapter.venue(), "Starting feed");
        spawn_feed(&mut tasks, Arc::clone(&registry), adapter, settings.channel_capacity);
    }
    tasks.spawn(report_loop(Arc::clone(&registry), settings.report_interval()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => error!(error = ?e, "Task stopped"),
                Some(Err(e)) => return Err(e).context("task panicked"),
            },
        }
    }
    tasks.shutdown().await;
    Ok(())
}
