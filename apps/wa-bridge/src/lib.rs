//! WhatsApp ingest bridge: reads transport notifications, normalizes
//! messages, and forwards them in signed batches to the ingest sink.

pub mod config;
pub mod main_logic;
pub mod pipeline;
pub mod transport;

pub use config::{BridgeConfig, ConfigError};
pub use main_logic::{run, shutdown_signal};
pub use pipeline::{Pipeline, StopReason};
pub use transport::{DecodeError, RosterKind, TransportEvent, decode_line, pump_lines};
