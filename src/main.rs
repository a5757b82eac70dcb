// Entry point of the economy storage service.
//
// **Architecture Overview:**
// - `core/` = Storage-access logic and ports (connection lifecycle, schema
//   migration, retention)
// - `infra/` = Implementations of core traits (MySQL, environment config)
//
// This file's job is to:
// 1. Load configuration
// 2. Wire the storage layer to the MySQL backend
// 3. Run until asked to stop, then shut down cleanly

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::config::ConfigProvider;
use crate::core::storage::StorageLayer;
use crate::infra::config::EnvConfigProvider;
use crate::infra::mysql::MySqlConnector;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config: Arc<dyn ConfigProvider> = Arc::new(EnvConfigProvider::new());
    let storage = StorageLayer::start(MySqlConnector::new(), config).await;

    let status = storage.connections().health_check().await;
    tracing::info!(status = ?status, "Economy storage layer started");

    tokio::signal::ctrl_c().await?;
    let stats = storage.connections().stats().await;
    tracing::info!(
        connects = stats.connects,
        reconnects = stats.reconnects,
        failures = stats.failures,
        "Shutdown requested"
    );

    storage.shutdown().await;
    Ok(())
}
