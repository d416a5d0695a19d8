//! Logging and metric helpers for the WhatsApp ingest bridge.

use anyhow::Result;

mod config;
pub mod recorders;
mod tracing_init;

pub use config::{LogFormat, TelemetryConfig};
pub use recorders::*;
pub use tracing_init::init_telemetry;

/// Installs the process-wide subscriber configured from `RUST_LOG`,
/// `LOG_FORMAT`, and `LOG_LEVEL`.
pub fn install(service_name: &str, service_version: &str) -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env(service_name, service_version))
}
