// Connection lifecycle manager.
//
// Owns the single live connection. Every establish/repair goes through one
// async mutex, so when many callers notice a dead connection at the same time
// only the first one reconnects and the rest observe its result.

use super::backend::{AccountBackend, BackendError, ConnectError, Connector, HealthStatus};
use crate::core::config::{ConfigProvider, DatabaseSettings};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::time::{timeout, Instant};

/// Upper bound for a single liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A borrowed connection. Holding it keeps the manager locked, so drop it as
/// soon as the current operation is done.
pub type Handle<'a, T> = MappedMutexGuard<'a, T>;

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub connects: u64,
    pub reconnects: u64,
    pub failures: u64,
    pub last_reconnect_ms: Option<u64>,
}

struct Slot<T> {
    conn: Option<T>,
    stats: ConnectionStats,
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: Arc<dyn ConfigProvider>,
    slot: Mutex<Slot<C::Conn>>,
    /// Bumped every time a new connection is installed.
    generation: AtomicU64,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create an unconnected manager. Nothing is opened until `connect`,
    /// `acquire` or `reconnect` is called.
    pub fn new(connector: C, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            connector,
            config,
            slot: Mutex::new(Slot {
                conn: None,
                stats: ConnectionStats::default(),
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Open a new connection from the current configuration and install it.
    ///
    /// On failure the previously installed handle (if any) is left untouched.
    pub async fn connect(&self) -> Result<Handle<'_, C::Conn>, ConnectError> {
        let mut slot = self.slot.lock().await;
        tracing::info!(backend = self.connector.backend_name(), "Connecting to the database...");

        match self.establish(&mut slot).await {
            Ok(()) => {
                slot.stats.connects += 1;
                tracing::info!("Database connection successful!");
            }
            Err(e) => {
                slot.stats.failures += 1;
                tracing::error!(error = %e, "Could not connect to the database");
                return Err(e);
            }
        }

        Self::into_handle(slot)
    }

    /// Hand out a connection that just passed a health check, repairing it
    /// inline (one attempt) if it did not.
    pub async fn acquire(&self) -> Result<Handle<'_, C::Conn>, ConnectError> {
        let mut slot = self.slot.lock().await;

        let status = Self::probe(slot.conn.as_mut()).await;
        if !status.is_healthy() {
            tracing::warn!(status = ?status, "Database connection unusable. Reconnecting...");
            self.reconnect_locked(&mut slot).await?;
        }

        Self::into_handle(slot)
    }

    /// Borrow the installed connection without checking or repairing it.
    ///
    /// Background jobs use this: they work with what is there and never
    /// establish a connection themselves.
    pub async fn current(&self) -> Option<Handle<'_, C::Conn>> {
        MutexGuard::try_map(self.slot.lock().await, |s| s.conn.as_mut()).ok()
    }

    pub async fn health_check(&self) -> HealthStatus {
        let mut slot = self.slot.lock().await;
        let status = Self::probe(slot.conn.as_mut()).await;
        if !status.is_healthy() {
            tracing::warn!(status = ?status, "Database connection is not healthy");
        }
        status
    }

    #[allow(dead_code)]
    /// Replace the connection with a freshly opened one.
    ///
    /// If another caller finished a reconnect while this one was waiting for
    /// the lock, that result is reused instead of opening yet another socket.
    pub async fn reconnect(&self) -> Result<(), ConnectError> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if self.generation.load(Ordering::Acquire) != observed && slot.conn.is_some() {
            tracing::debug!("Reconnect already completed by another caller");
            return Ok(());
        }

        self.reconnect_locked(&mut slot).await
    }

    /// Release the connection. Safe to call any number of times.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(conn) = slot.conn.take() {
            tracing::info!("Closing database connection...");
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "Database connection did not close cleanly");
            }
        }
    }

    pub async fn stats(&self) -> ConnectionStats {
        self.slot.lock().await.stats
    }

    async fn reconnect_locked(&self, slot: &mut Slot<C::Conn>) -> Result<(), ConnectError> {
        let start = Instant::now();
        tracing::info!(
            backend = self.connector.backend_name(),
            "Attempting to establish a connection to the database server"
        );

        match self.establish(slot).await {
            Ok(()) => {
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                slot.stats.reconnects += 1;
                slot.stats.last_reconnect_ms = Some(elapsed_ms);
                tracing::info!(elapsed_ms, "Connection to database server established in {} ms", elapsed_ms);
                Ok(())
            }
            Err(e) => {
                // A stale handle is worse than none: drop it so the next
                // caller sees `Missing` and tries again.
                slot.conn = None;
                slot.stats.failures += 1;
                tracing::error!(error = %e, "Error re-connecting to the database");
                Err(e)
            }
        }
    }

    /// Resolve settings, open, bootstrap the table and install the connection.
    /// Leaves `slot` unchanged on error.
    async fn establish(&self, slot: &mut Slot<C::Conn>) -> Result<(), ConnectError> {
        let settings = DatabaseSettings::from_provider(self.config.as_ref())
            .map_err(|e| ConnectError::Config(e.to_string()))?;

        let mut conn = match timeout(settings.connect_timeout, self.connector.open(&settings)).await {
            Ok(opened) => opened?,
            Err(_) => {
                return Err(ConnectError::Network(format!(
                    "timed out after {}s connecting to {}:{}",
                    settings.connect_timeout.as_secs(),
                    settings.host,
                    settings.port
                )))
            }
        };

        // The migrator runs the same statement later; this is only a bootstrap.
        if let Err(e) = conn.create_account_table(&settings.table).await {
            tracing::warn!(table = %settings.table, error = %e, "Could not bootstrap account table");
        }

        slot.conn = Some(conn);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn probe(conn: Option<&mut C::Conn>) -> HealthStatus {
        let Some(conn) = conn else {
            return HealthStatus::Missing;
        };

        match timeout(PROBE_TIMEOUT, conn.ping()).await {
            Ok(Ok(())) => HealthStatus::Healthy,
            Ok(Err(BackendError::ConnectionLost(_))) => HealthStatus::Closed,
            Ok(Err(_)) | Err(_) => HealthStatus::Invalid,
        }
    }

    fn into_handle(slot: MutexGuard<'_, Slot<C::Conn>>) -> Result<Handle<'_, C::Conn>, ConnectError> {
        MutexGuard::try_map(slot, |s| s.conn.as_mut())
            .map_err(|_| ConnectError::Network("no database connection available".to_string()))
    }
}
