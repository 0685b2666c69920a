// Source: wss://ws-subscriptions-clob.polymarket.com/ws/market (market channel)
//
// Numbers arrive as JSON strings ("0.48") on the live feed and as plain
// numbers in older captures; both are accepted.

use serde::Deserialize;
use serde_json::Value;

use super::FeedError;

pub const VENUE: &str = "polymarket";

pub(crate) mod flex {
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Float {
        Num(f64),
        Str(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int {
        Num(u64),
        Str(String),
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Float::deserialize(d)? {
            Float::Num(v) => Ok(v),
            Float::Str(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match Int::deserialize(d)? {
            Int::Num(v) => Ok(v),
            Int::Str(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderSummary {
    #[serde(deserialize_with = "flex::f64")]
    pub price: f64,
    #[serde(deserialize_with = "flex::f64")]
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookMessage {
    pub asset_id: String,
    #[serde(default)]
    pub market: String,
    #[serde(default, alias = "buys")]
    pub bids: Vec<OrderSummary>,
    #[serde(default, alias = "sells")]
    pub asks: Vec<OrderSummary>,
    #[serde(default, deserialize_with = "flex::u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceChange {
    #[serde(deserialize_with = "flex::f64")]
    pub price: f64,
    pub side: OrderSide,
    #[serde(deserialize_with = "flex::f64")]
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceChangeMessage {
    pub asset_id: String,
    #[serde(default)]
    pub market: String,
    pub changes: Vec<PriceChange>,
    #[serde(default, deserialize_with = "flex::u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickSizeChangeMessage {
    pub asset_id: String,
    #[serde(default)]
    pub market: String,
    #[serde(deserialize_with = "flex::f64")]
    pub old_tick_size: f64,
    #[serde(deserialize_with = "flex::f64")]
    pub new_tick_size: f64,
    #[serde(default, deserialize_with = "flex::u64")]
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LastTradePriceMessage {
    pub asset_id: String,
    #[serde(default)]
    pub market: String,
    #[serde(deserialize_with = "flex::f64")]
    pub price: f64,
    pub side: OrderSide,
    #[serde(deserialize_with = "flex::f64")]
    pub size: f64,
    #[serde(default, deserialize_with = "flex::f64")]
    pub fee_rate_bps: f64,
    #[serde(default, deserialize_with = "flex::u64")]
    pub timestamp: u64,
}

/// Market-channel messages, discriminated by `event_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum PolymarketMessage {
    Book(BookMessage),
    PriceChange(PriceChangeMessage),
    TickSizeChange(TickSizeChangeMessage),
    LastTradePrice(LastTradePriceMessage),
}

fn decode_error(source: serde_json::Error) -> FeedError {
    FeedError::Decode { venue: VENUE, source }
}

impl PolymarketMessage {
    pub fn from_value(value: Value) -> Result<Self, FeedError> {
        let tag = value.get("event_type").and_then(Value::as_str).unwrap_or_default().to_owned();
        let decoded = match tag.as_str() {
            "book" => serde_json::from_value(value).map(PolymarketMessage::Book),
            "price_change" => serde_json::from_value(value).map(PolymarketMessage::PriceChange),
            "tick_size_change" => serde_json::from_value(value).map(PolymarketMessage::TickSizeChange),
            "last_trade_price" => serde_json::from_value(value).map(PolymarketMessage::LastTradePrice),
            _ => return Err(FeedError::UnrecognisedMessage { venue: VENUE, tag }),
        };
        decoded.map_err(decode_error)
    }

    /// Decodes one websocket text frame; a frame holds a single message or an array.
    pub fn decode_frame(text: &str) -> Result<Vec<Self>, FeedError> {
        match serde_json::from_str::<Value>(text).map_err(decode_error)? {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => Ok(vec![Self::from_value(other)?]),
        }
    }
}
