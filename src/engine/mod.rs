pub mod book;
pub mod ladder;
pub mod registry;
pub mod types;

pub use book::{Column, OrderBook};
pub use ladder::Ladder;
pub use registry::{BookRegistry, InitOutcome, LevelUpdate};
pub use types::*;
