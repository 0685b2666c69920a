// Source: Kalshi trade API websocket (orderbook_delta / ticker_v2 / trade channels)
//
// Prices are integer cents of the "yes" or "no" contract; sizes are contract counts.
// Only decoding lives here: the authenticated transport stays outside this crate.

use serde::Deserialize;
use serde_json::Value;

use super::FeedError;

pub const VENUE: &str = "kalshi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractSide {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscribedDetail {
    pub channel: String,
    pub sid: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscribedMessage {
    pub id: u64,
    pub msg: SubscribedDetail,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OkMessage {
    pub id: u64,
    #[serde(default)]
    pub sid: Option<u64>,
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default)]
    pub market_tickers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorDetail {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub id: Option<u64>,
    pub msg: ErrorDetail,
}

/// `yes` / `no` are `[price_cents, count]` pairs; a side with no interest may be omitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnapshotDetail {
    pub market_ticker: String,
    #[serde(default)]
    pub yes: Option<Vec<(u32, f64)>>,
    #[serde(default)]
    pub no: Option<Vec<(u32, f64)>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderbookSnapshotMessage {
    pub sid: u64,
    pub seq: u64,
    pub msg: SnapshotDetail,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeltaDetail {
    pub market_ticker: String,
    pub price: u32,
    pub delta: f64,
    pub side: ContractSide,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderbookDeltaMessage {
    pub sid: u64,
    pub seq: u64,
    pub msg: DeltaDetail,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickerDetail {
    pub market_ticker: String,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub yes_bid: Option<i64>,
    #[serde(default)]
    pub yes_ask: Option<i64>,
    #[serde(default)]
    pub no_bid: Option<i64>,
    #[serde(default)]
    pub no_ask: Option<i64>,
    #[serde(default)]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickerMessage {
    pub sid: u64,
    pub msg: TickerDetail,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeDetail {
    pub market_ticker: String,
    pub yes_price: i64,
    pub no_price: i64,
    pub count: i64,
    pub taker_side: ContractSide,
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeMessage {
    pub sid: u64,
    pub msg: TradeDetail,
}

/// Server-to-client messages, discriminated by `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum KalshiMessage {
    Subscribed(SubscribedMessage),
    Ok(OkMessage),
    Error(ErrorMessage),
    OrderbookSnapshot(OrderbookSnapshotMessage),
    OrderbookDelta(OrderbookDeltaMessage),
    Ticker(TickerMessage),
    TickerV2(TickerMessage),
    Trade(TradeMessage),
}

fn decode_error(source: serde_json::Error) -> FeedError {
    FeedError::Decode { venue: VENUE, source }
}

impl KalshiMessage {
    pub fn from_value(value: Value) -> Result<Self, FeedError> {
        let tag = value.get("type").and_then(Value::as_str).unwrap_or_default().to_owned();
        let decoded = match tag.as_str() {
            "subscribed" => serde_json::from_value(value).map(KalshiMessage::Subscribed),
            "ok" => serde_json::from_value(value).map(KalshiMessage::Ok),
            "error" => serde_json::from_value(value).map(KalshiMessage::Error),
            "orderbook_snapshot" => serde_json::from_value(value).map(KalshiMessage::OrderbookSnapshot),
            "orderbook_delta" => serde_json::from_value(value).map(KalshiMessage::OrderbookDelta),
            "ticker" => serde_json::from_value(value).map(KalshiMessage::Ticker),
            "ticker_v2" => serde_json::from_value(value).map(KalshiMessage::TickerV2),
            "trade" => serde_json::from_value(value).map(KalshiMessage::Trade),
            _ => return Err(FeedError::UnrecognisedMessage { venue: VENUE, tag }),
        };
        decoded.map_err(decode_error)
    }

    pub fn decode(text: &str) -> Result<Self, FeedError> {
        Self::from_value(serde_json::from_str(text).map_err(decode_error)?)
    }
}
