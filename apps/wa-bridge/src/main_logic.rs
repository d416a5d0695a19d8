use std::io::{self, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_dispatch::HttpDeliveryClient;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::pipeline::Pipeline;
use crate::transport::spawn_reader;

/// Runs the bridge over standard input until a termination signal or the
/// end of input.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let client = HttpDeliveryClient::new(
        config.sink_url.clone(),
        config.signer.clone(),
        config.sink_timeout,
        config.token_ttl,
    )
    .context("build sink client")?;

    let (tx, mut rx) = mpsc::channel(config.channel_capacity);
    spawn_reader(BufReader::new(io::stdin()), tx).context("start transport reader")?;

    let mut pipeline = Pipeline::new(config.dispatch_settings(), Arc::new(client));
    info!(
        bridge_id = %config.bridge_id,
        sink = %config.sink_url,
        batch_size = config.batch_size,
        flush_ms = config.flush_interval.as_millis() as u64,
        "wa-bridge started"
    );

    let (reason, report) = pipeline.run(&mut rx, shutdown_signal()).await;
    info!(?reason, ?report, "wa-bridge stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
