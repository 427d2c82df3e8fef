//! FreightMesh node entry point.
//!
//! Startup order: telemetry, configuration, runtime. Only configuration
//! the node cannot run without aborts startup; every other problem is
//! logged and degrades.

use anyhow::{Context, Result};
use fm_telemetry::{init_telemetry, TelemetryConfig};
use service_runtime::{MeshConfig, MeshRuntime};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::for_service("freightmesh");
    init_telemetry(&telemetry).context("initialize telemetry")?;

    let config = MeshConfig::from_env();
    config.validate().context("configuration rejected")?;

    let runtime = MeshRuntime::start(config).await.context("start mesh node")?;

    info!("mesh node is running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("listen for shutdown signal")?;

    runtime.shutdown().await;
    Ok(())
}
