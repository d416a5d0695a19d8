use std::collections::BTreeSet;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_EVENTS_JSONL: &str = "data/events.jsonl";
pub const DEFAULT_MAX_BATCH: usize = 1000;

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub bind: SocketAddr,
    pub events_path: PathBuf,
    pub max_batch: usize,
    /// Bridge ids allowed to post. Empty admits every bridge.
    pub allowlist: BTreeSet<String>,
    pub jwt_secret: String,
}

impl SinkConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("WA_JWT_SECRET").context("WA_JWT_SECRET must be set")?;
        let bind = get("BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("BIND must be a socket address")?;
        let max_batch = match get("WA_INGEST_MAX_BATCH") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("WA_INGEST_MAX_BATCH must be an integer, got {raw:?}"))?,
            None => DEFAULT_MAX_BATCH,
        };
        if max_batch == 0 {
            bail!("WA_INGEST_MAX_BATCH must be greater than zero");
        }
        let allowlist = get("WA_ALLOWLIST_BRIDGES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind,
            events_path: PathBuf::from(
                get("EVENTS_JSONL").unwrap_or_else(|| DEFAULT_EVENTS_JSONL.to_string()),
            ),
            max_batch,
            allowlist,
            jwt_secret,
        })
    }
}
