use anyhow::Result;
use bridge_telemetry::install as init_telemetry;
use wa_bridge::{BridgeConfig, run};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry("wa-bridge", env!("CARGO_PKG_VERSION"))?;

    let config = BridgeConfig::from_env()?;
    run(config).await
}
