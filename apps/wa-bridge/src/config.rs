use std::env;
use std::str::FromStr;
use std::time::Duration;

use bridge_dispatch::{DispatchSettings, FlushTimerMode, OverflowPolicy};
use security::JwtSigner;
use thiserror::Error;

pub const DEFAULT_BRIDGE_ID: &str = "wa-bridge";
pub const DEFAULT_SINK_URL: &str = "http://127.0.0.1:8000/ingest/wa";
const DEFAULT_FLUSH_MS: u64 = 1500;
const DEFAULT_BATCH_SIZE: usize = 200;
const DEFAULT_SINK_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_TOKEN_TTL_SECS: u64 = 120;
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error("{var} has unsupported value {value:?}, expected one of {expected}")]
    UnknownValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("invalid signing identity")]
    Signer(#[source] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bridge_id: String,
    pub flush_interval: Duration,
    pub batch_size: usize,
    pub sink_url: String,
    pub signer: JwtSigner,
    pub sink_timeout: Duration,
    pub token_ttl: Duration,
    pub timer_mode: FlushTimerMode,
    pub max_buffered: Option<usize>,
    pub overflow: OverflowPolicy,
    pub max_attempts: Option<u32>,
    pub channel_capacity: usize,
}

impl BridgeConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a local `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let flush_ms: u64 = positive(&get, "FLUSH_MS", DEFAULT_FLUSH_MS)?;
        let sink_timeout_ms: u64 = positive(&get, "SINK_TIMEOUT_MS", DEFAULT_SINK_TIMEOUT_MS)?;
        let token_ttl_secs: u64 = positive(&get, "TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;

        let timer_mode = match get("FLUSH_TIMER_MODE").as_deref() {
            None | Some("deadline") => FlushTimerMode::Deadline,
            Some("debounce") => FlushTimerMode::Debounce,
            Some(other) => {
                return Err(ConfigError::UnknownValue {
                    var: "FLUSH_TIMER_MODE",
                    value: other.to_string(),
                    expected: "deadline, debounce",
                });
            }
        };
        let overflow = match get("OVERFLOW_POLICY").as_deref() {
            None | Some("drop-oldest") => OverflowPolicy::DropOldest,
            Some("drop-newest") => OverflowPolicy::DropNewest,
            Some("block") => OverflowPolicy::Block,
            Some(other) => {
                return Err(ConfigError::UnknownValue {
                    var: "OVERFLOW_POLICY",
                    value: other.to_string(),
                    expected: "drop-oldest, drop-newest, block",
                });
            }
        };

        let signer = JwtSigner::from_lookup(&lookup).map_err(ConfigError::Signer)?;

        Ok(Self {
            bridge_id: get("BRIDGE_ID").unwrap_or_else(|| DEFAULT_BRIDGE_ID.to_string()),
            flush_interval: Duration::from_millis(flush_ms),
            batch_size: positive(&get, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            sink_url: get("BACKEND_INGEST").unwrap_or_else(|| DEFAULT_SINK_URL.to_string()),
            signer,
            sink_timeout: Duration::from_millis(sink_timeout_ms),
            token_ttl: Duration::from_secs(token_ttl_secs),
            timer_mode,
            max_buffered: optional_positive(&get, "MAX_BUFFERED")?,
            overflow,
            max_attempts: optional_positive(&get, "MAX_DELIVERY_ATTEMPTS")?,
            channel_capacity: positive(&get, "CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY)?,
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            bridge_id: self.bridge_id.clone(),
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            timer_mode: self.timer_mode,
            capacity: self.max_buffered,
            overflow: self.overflow,
            max_attempts: self.max_attempts,
        }
    }
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { var, value })
}

fn optional_positive<T, G>(get: &G, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialEq + Default,
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(var) else {
        return Ok(None);
    };
    let value: T = parse(var, raw)?;
    if value == T::default() {
        return Err(ConfigError::Zero { var });
    }
    Ok(Some(value))
}

fn positive<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    G: Fn(&str) -> Option<String>,
{
    Ok(optional_positive(get, var)?.unwrap_or(default))
}
