use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Tick size every market starts with unless a venue announces another one.
pub const DEFAULT_TICK_SIZE: f64 = 0.01;

/// Slack allowed when comparing prices against the [0, 1] band.
pub(crate) const PRICE_EPSILON: f64 = 1e-9;
/// Quantities closer to zero than this are float residue and snap to zero.
pub(crate) const QTY_EPSILON: f64 = 1e-9;

/// Index into a ladder; the level's price is `tick * tick_size`.
pub type PriceTick = usize;

/// Trades produced by one crossing order. Most orders hit one or two levels.
pub type Trades = SmallVec<[Trade; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Offer,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Offer,
            Side::Offer => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Offer => write!(f, "offer"),
        }
    }
}

/// Which contract of a binary market a venue message talks about.
///
/// Books are stored from the "yes" perspective only; "no" interest is
/// folded in through [`Predicate::orient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Yes,
    No,
}

/// Canonical side for an incoming update, and whether its prices must be
/// mirrored to `1 - p` before they touch the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation {
    pub side: Side,
    pub mirror_price: bool,
}

impl Predicate {
    /// Maps a (predicate, side) pair onto the canonical yes book.
    ///
    /// - yes/any: unchanged
    /// - no/bid: a yes offer at `1 - p` (buying "no" at p sells "yes" at 1 - p)
    /// - no/offer: a yes bid, prices untouched
    pub fn orient(self, side: Side) -> Orientation {
        match (self, side) {
            (Predicate::Yes, side) => Orientation { side, mirror_price: false },
            (Predicate::No, Side::Bid) => Orientation { side: Side::Offer, mirror_price: true },
            (Predicate::No, Side::Offer) => Orientation { side: Side::Bid, mirror_price: false },
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Yes => write!(f, "yes"),
            Predicate::No => write!(f, "no"),
        }
    }
}

/// One (price, quantity) level of a ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderEntry {
    pub price: f64,
    pub quantity: f64,
}

impl LadderEntry {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }

    /// The same interest seen from the opposite contract: price becomes `1 - price`.
    pub fn mirrored(self) -> Self {
        Self { price: 1.0 - self.price, quantity: self.quantity }
    }
}

/// Synthetic execution emitted when an order crosses resting interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub price: f64,
    pub quantity: f64,
}

/// Identity of one market on one exchange. Compared and hashed by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketKey {
    pub exchange_id: String,
    pub market_id: String,
}

impl MarketKey {
    pub fn new(exchange_id: impl Into<String>, market_id: impl Into<String>) -> Self {
        Self { exchange_id: exchange_id.into(), market_id: market_id.into() }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.exchange_id, self.market_id)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookError {
    #[error("price {price} is outside [0, 1] or off the ladder at tick size {tick_size}")]
    InvalidPrice { price: f64, tick_size: f64 },

    #[error("quantity {quantity} must be finite and non-negative")]
    InvalidQuantity { quantity: f64 },

    #[error("tick {tick} is outside a ladder of {levels} levels")]
    TickOutOfRange { tick: PriceTick, levels: usize },

    #[error("tick size {tick_size} must be finite and in (0, 1]")]
    InvalidTickSize { tick_size: f64 },

    #[error("no order book registered for market {key}")]
    UnknownMarket { key: MarketKey },

    #[error("book needs both sides populated (bids: {has_bids}, offers: {has_offers})")]
    OneSidedBook { has_bids: bool, has_offers: bool },

    #[error("{side} level at tick {tick} would go negative ({quantity})")]
    NegativeLevel { side: Side, tick: PriceTick, quantity: f64 },

    #[error("{side} quantity not conserved across tick size change: {before} -> {after}")]
    QuantityNotConserved { side: Side, before: f64, after: f64 },
}

impl BookError {
    /// Errors that mean upstream data is corrupt rather than one bad request.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, BookError::NegativeLevel { .. } | BookError::QuantityNotConserved { .. })
    }
}

pub type BookResult<T> = Result<T, BookError>;

/// Longest ladder a book may allocate; a tick of 1e-6.
pub const MAX_LEVELS: usize = 1_000_001;

/// Accepts ticks in (0, 1] whose ladder stays within [`MAX_LEVELS`].
pub fn validate_tick_size(tick_size: f64) -> BookResult<()> {
    let in_band = tick_size.is_finite() && tick_size > 0.0 && tick_size <= 1.0;
    if in_band && (1.0 / tick_size + PRICE_EPSILON).floor() + 1.0 <= MAX_LEVELS as f64 {
        Ok(())
    } else {
        Err(BookError::InvalidTickSize { tick_size })
    }
}

/// Number of discrete price levels for a tick size: `floor(1 / tick) + 1`.
pub(crate) fn level_count(tick_size: f64) -> usize {
    (1.0 / tick_size + PRICE_EPSILON).floor() as usize + 1
}
