// Storage layer - wires connection, migration and retention together in the
// order they depend on each other:
//
//   connect -> ensure table -> column migrations -> arm purge timer
//
// Nothing here fails startup. A missing database degrades to "unavailable,
// retried on next use"; the host keeps running either way.

use crate::core::config::{ConfigProvider, DatabaseSettings, RetentionSettings};
use crate::core::connection::{ConnectionManager, Connector};
use crate::core::retention::PurgeScheduler;
use crate::core::schema::{run_migrations, ACCOUNT_COLUMN_MIGRATIONS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct StorageLayer<C: Connector> {
    manager: Arc<ConnectionManager<C>>,
    purge: Option<PurgeScheduler>,
    keep_alive: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl<C: Connector> StorageLayer<C> {
    pub async fn start(connector: C, config: Arc<dyn ConfigProvider>) -> Self {
        let mut layer = Self {
            manager: Arc::new(ConnectionManager::new(connector, Arc::clone(&config))),
            purge: None,
            keep_alive: None,
            shutdown: CancellationToken::new(),
        };

        let settings = match DatabaseSettings::from_provider(config.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(error = %e, "Invalid database configuration, storage layer disabled");
                return layer;
            }
        };

        let connected = layer.manager.connect().await.is_ok();
        if connected {
            let report = run_migrations(&layer.manager, &settings.table, ACCOUNT_COLUMN_MIGRATIONS).await;
            if !report.table_ready {
                tracing::warn!(table = %settings.table, "Account table is not ready; queries will fail until it exists");
            }
        } else {
            tracing::warn!("Starting without a database connection; it will be retried on first use");
        }

        match RetentionSettings::from_provider(config.as_ref()) {
            Ok(Some(retention)) => {
                layer.purge = Some(PurgeScheduler::arm(
                    Arc::clone(&layer.manager),
                    settings.table.clone(),
                    retention,
                ));
            }
            Ok(None) => tracing::info!("Removal of old accounts is disabled"),
            Err(e) => tracing::error!(error = %e, "Invalid retention configuration, old accounts will not be removed"),
        }

        if let Some(every) = settings.keep_alive {
            layer.keep_alive = Some(spawn_keep_alive(
                Arc::clone(&layer.manager),
                every,
                layer.shutdown.clone(),
            ));
        }

        layer
    }

    /// The connection manager business code issues its queries through.
    pub fn connections(&self) -> &Arc<ConnectionManager<C>> {
        &self.manager
    }

    /// Stop background work and release the connection.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Some(task) = self.keep_alive {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Keep-alive task ended abnormally");
            }
        }
        if let Some(purge) = self.purge {
            purge.cancel().await;
        }
        self.manager.close().await;
    }
}

/// Periodically acquire the connection so a dropped link is repaired before
/// business traffic runs into it.
fn spawn_keep_alive<C: Connector>(
    manager: Arc<ConnectionManager<C>>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(every) => {}
            }

            if let Err(e) = manager.acquire().await {
                tracing::warn!(error = %e, "Keep-alive could not reach the database");
            }
        }
    })
}
