//! coved — cove vault manager daemon.

use anyhow::Result;

use coved::manager::{ManagerOptions, VaultManager};

#[tokio::main(worker_threads = 3)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let manager = VaultManager::start(ManagerOptions::production()).await?;
    tracing::info!(
        port = manager.local_port(),
        config = %manager.config_path().display(),
        "coved running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    manager.shutdown().await;
    Ok(())
}
