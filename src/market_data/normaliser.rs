// Convert decoded venue messages into registry events.
// Books are keyed by (venue, instrument id); prices land in [0, 1].

use crate::engine::{LadderEntry, LevelUpdate, MarketKey, Predicate, Side};
use crate::market_data::adapters::kalshi_types::{self, ContractSide, KalshiMessage};
use crate::market_data::adapters::polymarket_types::{self, OrderSide, OrderSummary, PolymarketMessage};
use crate::market_data::adapters::MarketEvent;

#[derive(Debug, Clone, Copy)]
pub struct Normaliser {
    pub price_decimals: u32, // cent-quoted prices are rounded to this many places
}

impl Default for Normaliser {
    fn default() -> Self {
        Self { price_decimals: 3 }
    }
}

impl Normaliser {
    fn round(&self, price: f64) -> f64 {
        let scale = 10f64.powi(self.price_decimals as i32);
        (price * scale).round() / scale
    }

    pub fn cents_to_price(&self, cents: u32) -> f64 {
        self.round(f64::from(cents) / 100.0)
    }

    /// Price of the yes contract implied by a no-contract quote in cents.
    pub fn complement_cents_to_price(&self, cents: u32) -> f64 {
        self.round(1.0 - f64::from(cents) / 100.0)
    }

    pub fn polymarket(&self, msg: &PolymarketMessage) -> Vec<MarketEvent> {
        let key = |asset_id: &str| MarketKey::new(polymarket_types::VENUE, asset_id);
        match msg {
            PolymarketMessage::Book(book) => vec![MarketEvent::Snapshot {
                key: key(&book.asset_id),
                bids: entries(&book.bids),
                offers: entries(&book.asks),
            }],
            PolymarketMessage::PriceChange(change) => {
                let (bids, offers): (Vec<_>, Vec<_>) =
                    change.changes.iter().partition(|c| c.side == OrderSide::Buy);
                [(Side::Bid, bids), (Side::Offer, offers)]
                    .into_iter()
                    .filter(|(_, changes)| !changes.is_empty())
                    .map(|(side, changes)| MarketEvent::Levels {
                        key: key(&change.asset_id),
                        predicate: Predicate::Yes,
                        side,
                        update: LevelUpdate::Batch(
                            changes.iter().map(|c| LadderEntry::new(c.price, c.size)).collect(),
                        ),
                        is_delta: false,
                    })
                    .collect()
            }
            PolymarketMessage::TickSizeChange(change) => vec![MarketEvent::TickSize {
                key: key(&change.asset_id),
                tick_size: change.new_tick_size,
            }],
            PolymarketMessage::LastTradePrice(_) => Vec::new(),
        }
    }

    pub fn kalshi(&self, msg: &KalshiMessage) -> Vec<MarketEvent> {
        let key = |ticker: &str| MarketKey::new(kalshi_types::VENUE, ticker);
        match msg {
            KalshiMessage::OrderbookSnapshot(snapshot) => {
                let detail = &snapshot.msg;
                let bids = detail
                    .yes
                    .iter()
                    .flatten()
                    .map(|&(cents, count)| LadderEntry::new(self.cents_to_price(cents), count))
                    .collect();
                let offers = detail
                    .no
                    .iter()
                    .flatten()
                    .map(|&(cents, count)| LadderEntry::new(self.complement_cents_to_price(cents), count))
                    .collect();
                vec![MarketEvent::Snapshot { key: key(&detail.market_ticker), bids, offers }]
            }
            KalshiMessage::OrderbookDelta(delta) => {
                let detail = &delta.msg;
                let predicate = match detail.side {
                    ContractSide::Yes => Predicate::Yes,
                    ContractSide::No => Predicate::No,
                };
                vec![MarketEvent::Levels {
                    key: key(&detail.market_ticker),
                    predicate,
                    side: Side::Bid,
                    update: LevelUpdate::Single(LadderEntry::new(self.cents_to_price(detail.price), detail.delta)),
                    is_delta: true,
                }]
            }
            KalshiMessage::Subscribed(_)
            | KalshiMessage::Ok(_)
            | KalshiMessage::Error(_)
            | KalshiMessage::Ticker(_)
            | KalshiMessage::TickerV2(_)
            | KalshiMessage::Trade(_) => Vec::new(),
        }
    }
}

fn entries(levels: &[OrderSummary]) -> Vec<LadderEntry> {
    levels.iter().map(|l| LadderEntry::new(l.price, l.size)).collect()
}
