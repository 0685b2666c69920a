// Market data module entrypoint
pub mod adapters;   // venue wire types + websocket adapters
pub mod normaliser; // venue messages -> registry events
pub mod router;     // feeds -> registry, top-of-book reporter
