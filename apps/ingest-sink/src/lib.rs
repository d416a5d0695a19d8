//! Reference ingest endpoint for bridge batches.
//!
//! Verifies the bridge bearer token, applies the optional bridge allowlist
//! and batch limit, and appends each event as one JSON line stamped with
//! `ts_server`.

pub mod config;
pub mod error;
pub mod http;
pub mod store;

pub use config::SinkConfig;
pub use error::IngestError;
pub use http::{SinkState, build_router};
pub use store::EventStore;
