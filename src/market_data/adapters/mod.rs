// Shared trait + event for venue adapters

use crate::engine::{LadderEntry, LevelUpdate, MarketKey, Predicate, Side};

/// A decoded venue message, already expressed in registry vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    // Full book in canonical yes orientation
    Snapshot {
        key: MarketKey,
        bids: Vec<LadderEntry>,
        offers: Vec<LadderEntry>,
    },
    // Resting-level write, still in venue (predicate, side) terms
    Levels {
        key: MarketKey,
        predicate: Predicate,
        side: Side,
        update: LevelUpdate,
        is_delta: bool,
    },
    TickSize {
        key: MarketKey,
        tick_size: f64,
    },
}

impl MarketEvent {
    pub fn key(&self) -> &MarketKey {
        match self {
            MarketEvent::Snapshot { key, .. } | MarketEvent::Levels { key, .. } | MarketEvent::TickSize { key, .. } => {
                key
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("{venue}: malformed message: {source}")]
    Decode {
        venue: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{venue}: unrecognised message type {tag:?}")]
    UnrecognisedMessage { venue: &'static str, tag: String },

    #[error("{venue}: transport failure: {source}")]
    Transport {
        venue: &'static str,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("{venue}: event channel closed")]
    ChannelClosed { venue: &'static str },
}

impl FeedError {
    /// Problems with one frame; the stream itself is still usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FeedError::Decode { .. } | FeedError::UnrecognisedMessage { .. })
    }
}

#[async_trait::async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> &'static str;

    // Streams decoded events into the router until the venue closes or the receiver is dropped.
    async fn spawn(&self, tx: tokio::sync::mpsc::Sender<MarketEvent>) -> Result<(), FeedError>;
}

pub mod kalshi_types;
pub mod polymarket;
pub mod polymarket_types;
