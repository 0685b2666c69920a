pub mod config;
pub mod engine;
pub mod market_data;
pub mod telemetry;

pub use config::Settings;
pub use engine::{BookError, BookRegistry, BookResult, LadderEntry, MarketKey, OrderBook, Predicate, Side};
