//! Process-wide set of order books, one per (exchange, market).
//!
//! The key map sits behind a short-held `parking_lot::RwLock` that is only
//! taken for lookup and get-or-insert, never across an `.await`. Each book
//! lives behind its own `tokio::sync::Mutex`, so work on one market never
//! waits on another. Entries are never removed.
//!
//! Writes arrive in venue terms (yes/no contract, bid/offer) and are folded
//! into the canonical yes book via [`Predicate::orient`].

use std::collections::hash_map::Entry;
use std::sync::Arc;

use ahash::AHashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::engine::book::{Column, OrderBook};
use crate::engine::types::{
    validate_tick_size, BookError, BookResult, LadderEntry, MarketKey, Predicate, Side, Trades,
    DEFAULT_TICK_SIZE,
};

type BookCell = Arc<Mutex<OrderBook>>;

/// Payload of a level write: one entry or an ordered batch.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelUpdate {
    Single(LadderEntry),
    Batch(Vec<LadderEntry>),
}

impl LevelUpdate {
    pub fn len(&self) -> usize {
        match self {
            LevelUpdate::Single(_) => 1,
            LevelUpdate::Batch(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mirrored(self) -> Self {
        match self {
            LevelUpdate::Single(entry) => LevelUpdate::Single(entry.mirrored()),
            LevelUpdate::Batch(entries) => LevelUpdate::Batch(entries.into_iter().map(LadderEntry::mirrored).collect()),
        }
    }
}

impl From<LadderEntry> for LevelUpdate {
    fn from(entry: LadderEntry) -> Self {
        LevelUpdate::Single(entry)
    }
}

impl From<Vec<LadderEntry>> for LevelUpdate {
    fn from(entries: Vec<LadderEntry>) -> Self {
        LevelUpdate::Batch(entries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// First snapshot for the key; a new book was installed.
    Created,
    /// A book already existed; the snapshot was written onto it as absolute levels.
    Reconciled,
}

#[derive(Debug)]
pub struct BookRegistry {
    default_tick_size: f64,
    books: RwLock<AHashMap<MarketKey, BookCell>>,
}

impl Default for BookRegistry {
    fn default() -> Self {
        Self { default_tick_size: DEFAULT_TICK_SIZE, books: RwLock::new(AHashMap::new()) }
    }
}

impl BookRegistry {
    pub fn new(default_tick_size: f64) -> BookResult<Self> {
        validate_tick_size(default_tick_size)?;
        Ok(Self { default_tick_size, books: RwLock::new(AHashMap::new()) })
    }

    pub fn default_tick_size(&self) -> f64 {
        self.default_tick_size
    }

    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.read().is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<MarketKey> {
        self.books.read().keys().cloned().sorted().collect()
    }

    fn lookup(&self, key: &MarketKey) -> BookResult<BookCell> {
        self.books
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BookError::UnknownMarket { key: key.clone() })
    }

    /// Installs `book` unless another caller got there first; returns the
    /// existing cell in that case.
    fn install(&self, key: &MarketKey, book: OrderBook) -> Option<BookCell> {
        let mut books = self.books.write();
        match books.entry(key.clone()) {
            Entry::Occupied(slot) => Some(slot.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(book)));
                metrics::gauge!("predbook_books").set(books.len() as f64);
                None
            }
        }
    }

    /// Creates the book on first sight of `key`; afterwards reconciles the
    /// snapshot onto the existing book as two absolute writes, bids then
    /// offers, each under its own lock acquisition.
    #[instrument(skip(self, bids, offers), fields(market = %key, bids = bids.len(), offers = offers.len()))]
    pub async fn init_order_book(
        &self,
        key: MarketKey,
        bids: Vec<LadderEntry>,
        offers: Vec<LadderEntry>,
    ) -> BookResult<InitOutcome> {
        let existing = self.books.read().get(&key).cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => {
                let book = OrderBook::new(self.default_tick_size, &bids, &offers)?;
                match self.install(&key, book) {
                    None => {
                        info!(tick_size = self.default_tick_size, "Registered order book");
                        return Ok(InitOutcome::Created);
                    }
                    Some(cell) => cell,
                }
            }
        };

        cell.lock().await.update_levels(&bids, Side::Bid, false)?;
        cell.lock().await.update_levels(&offers, Side::Offer, false)?;
        metrics::counter!("predbook_level_updates_total").increment((bids.len() + offers.len()) as u64);
        debug!("Reconciled snapshot onto existing book");
        Ok(InitOutcome::Reconciled)
    }

    /// Writes resting levels expressed from either contract's perspective.
    #[instrument(level = "trace", skip(self, data))]
    pub async fn update_order_book(
        &self,
        exchange_id: &str,
        market_id: &str,
        predicate: Predicate,
        side: Side,
        data: impl Into<LevelUpdate>,
        is_delta: bool,
    ) -> BookResult<()> {
        let orientation = predicate.orient(side);
        let mut data = data.into();
        if orientation.mirror_price {
            data = data.mirrored();
        }
        let cell = self.lookup(&MarketKey::new(exchange_id, market_id))?;
        let mut book = cell.lock().await;
        match &data {
            LevelUpdate::Single(entry) => book.update_level(*entry, orientation.side, is_delta)?,
            LevelUpdate::Batch(entries) => book.update_levels(entries, orientation.side, is_delta)?,
        }
        metrics::counter!("predbook_level_updates_total").increment(data.len() as u64);
        Ok(())
    }

    /// Sends a crossing order through the book, with the same yes/no folding
    /// as [`update_order_book`](Self::update_order_book). Trade prices come
    /// back in yes terms.
    #[instrument(level = "debug", skip(self))]
    pub async fn add_limit_order(
        &self,
        exchange_id: &str,
        market_id: &str,
        predicate: Predicate,
        side: Side,
        entry: LadderEntry,
    ) -> BookResult<Trades> {
        let orientation = predicate.orient(side);
        let entry = if orientation.mirror_price { entry.mirrored() } else { entry };
        let cell = self.lookup(&MarketKey::new(exchange_id, market_id))?;
        let trades = cell.lock().await.add_limit_order(entry, orientation.side)?;
        metrics::counter!("predbook_trades_total").increment(trades.len() as u64);
        Ok(trades)
    }

    /// Reads both ladders as sparse, price-ascending lists.
    ///
    /// `Predicate::Yes` returns the canonical (bids, offers). `Predicate::No`
    /// returns the book as a "no" trader sees it: no-bids are yes-offers at
    /// `1 - p`, no-offers are yes-bids at `1 - p`.
    pub async fn get_market(
        &self,
        exchange_id: &str,
        market_id: &str,
        predicate: Predicate,
    ) -> BookResult<(Vec<LadderEntry>, Vec<LadderEntry>)> {
        let cell = self.lookup(&MarketKey::new(exchange_id, market_id))?;
        let (bids, offers) = {
            let book = cell.lock().await;
            (book.bids(), book.offers())
        };
        Ok(match predicate {
            Predicate::Yes => (bids, offers),
            Predicate::No => (
                offers.into_iter().rev().map(LadderEntry::mirrored).collect(),
                bids.into_iter().rev().map(LadderEntry::mirrored).collect(),
            ),
        })
    }

    #[instrument(skip(self))]
    pub async fn set_tick_size(&self, exchange_id: &str, market_id: &str, tick_size: f64) -> BookResult<()> {
        let cell = self.lookup(&MarketKey::new(exchange_id, market_id))?;
        cell.lock().await.set_tick_size(tick_size)?;
        metrics::counter!("predbook_tick_size_changes_total").increment(1);
        Ok(())
    }

    pub async fn best(
        &self,
        exchange_id: &str,
        market_id: &str,
    ) -> BookResult<(Option<LadderEntry>, Option<LadderEntry>)> {
        let cell = self.lookup(&MarketKey::new(exchange_id, market_id))?;
        let best = cell.lock().await.get_best();
        Ok(best)
    }

    pub async fn column(&self, exchange_id: &str, market_id: &str) -> BookResult<Column> {
        let cell = self.lookup(&MarketKey::new(exchange_id, market_id))?;
        let column = cell.lock().await.get_column();
        column
    }
}
