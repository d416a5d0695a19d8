use anyhow::Result;
use axum::serve;
use bridge_telemetry::install as init_telemetry;
use ingest_sink::{SinkConfig, SinkState, build_router};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry("ingest-sink", env!("CARGO_PKG_VERSION"))?;

    let config = SinkConfig::from_env()?;
    let router = build_router(SinkState::from_config(&config));
    let listener = TcpListener::bind(config.bind).await?;
    info!(
        file = %config.events_path.display(),
        max_batch = config.max_batch,
        "ingest-sink listening on {}",
        config.bind
    );

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
