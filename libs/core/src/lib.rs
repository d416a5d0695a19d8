//! Event model, display-name directory, and message normalization for the
//! WhatsApp ingest bridge.
//!
//! Everything in this crate is synchronous and free of I/O: the transport feeds
//! raw notifications in, the dispatch layer takes canonical events out.
pub mod directory;
pub mod normalize;
pub mod types;

pub use directory::*;
pub use normalize::*;
pub use types::*;
