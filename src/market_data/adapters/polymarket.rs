// Polymarket CLOB market-channel adapter
//
// One websocket per adapter; every asset id is subscribed in a single message.
// The venue drops idle sockets, so a text "PING" goes out on a fixed interval.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use super::polymarket_types::{PolymarketMessage, VENUE};
use super::{FeedError, MarketEvent, VenueAdapter};
use crate::market_data::normaliser::Normaliser;

pub const DEFAULT_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

pub struct PolymarketAdapter {
    pub asset_ids: Vec<String>, // ERC-1155 token ids, one per outcome
    pub ws_url: String,
    normaliser: Normaliser,
}

impl PolymarketAdapter {
    pub fn new(asset_ids: Vec<String>, ws_url: impl Into<String>) -> Self {
        Self { asset_ids, ws_url: ws_url.into(), normaliser: Normaliser::default() }
    }

    pub fn subscribe_message(&self) -> serde_json::Value {
        serde_json::json!({
            "assets_ids": self.asset_ids,
            "type": "market",
        })
    }

    /// Decodes one text frame into registry events.
    pub fn events_from_frame(&self, text: &str) -> Result<Vec<MarketEvent>, FeedError> {
        let messages = PolymarketMessage::decode_frame(text)?;
        Ok(messages.iter().flat_map(|msg| self.normaliser.polymarket(msg)).collect())
    }

    async fn forward(&self, text: &str, tx: &mpsc::Sender<MarketEvent>) -> Result<(), FeedError> {
        let events = match self.events_from_frame(text) {
            Ok(events) => events,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Skipping frame");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        for event in events {
            tx.send(event).await.map_err(|_| FeedError::ChannelClosed { venue: VENUE })?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl VenueAdapter for PolymarketAdapter {
    fn venue(&self) -> &'static str {
        VENUE
    }

    #[instrument(skip_all, fields(venue = VENUE))]
    async fn spawn(&self, tx: mpsc::Sender<MarketEvent>) -> Result<(), FeedError> {
        let transport = |source| FeedError::Transport { venue: VENUE, source };

        let (ws_stream, response) = tokio_tungstenite::connect_async(self.ws_url.as_str()).await.map_err(transport)?;
        info!(url = %self.ws_url, status = %response.status(), assets = self.asset_ids.len(), "Connected");
        let (mut write, mut read) = ws_stream.split();

        write.send(Message::Text(self.subscribe_message().to_string())).await.map_err(transport)?;
        debug!("Subscription sent");

        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await;

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    write.send(Message::Text("PING".into())).await.map_err(transport)?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if text == "PONG" {
                                continue;
                            }
                            self.forward(&text, &tx).await?;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            write.send(Message::Pong(payload)).await.map_err(transport)?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "Closed by venue");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(transport(e)),
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}
