// Ports implemented by the infra layer: how to open a connection, and what a
// live connection must be able to do for the storage layer.

use crate::core::config::{DatabaseSettings, SqlIdentifier};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure to obtain a usable connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The driver for the configured backend is unavailable or cannot be set up.
    #[error("Database driver unavailable: {0}")]
    DriverMissing(String),

    /// The server answered but rejected us (credentials, unknown database, ...).
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid database configuration: {0}")]
    Config(String),
}

/// Error raised by a statement on an open connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Column already exists: {0}")]
    DuplicateColumn(String),

    /// The socket is gone; the handle will never work again.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Query failed: {0}")]
    Query(String),
}

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// No handle has been established (or it was released).
    Missing,
    /// The liveness probe failed or timed out.
    Invalid,
    /// The handle reports its underlying connection as closed.
    Closed,
}

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        self == HealthStatus::Healthy
    }
}

// ============================================================================
// TRAITS (PORTS)
// ============================================================================

/// Operations the storage layer needs from one physical connection.
#[async_trait]
pub trait AccountBackend: Sized + Send + 'static {
    /// Driver-level liveness probe. Not a full query.
    async fn ping(&mut self) -> Result<(), BackendError>;

    /// `CREATE TABLE IF NOT EXISTS` for the baseline account table.
    async fn create_account_table(&mut self, table: &SqlIdentifier) -> Result<(), BackendError>;

    /// Probe backend metadata for a column.
    async fn column_exists(
        &mut self,
        table: &SqlIdentifier,
        column: &SqlIdentifier,
    ) -> Result<bool, BackendError>;

    /// `ALTER TABLE .. ADD COLUMN`. Must map "column already exists" to
    /// [`BackendError::DuplicateColumn`].
    async fn add_column(
        &mut self,
        table: &SqlIdentifier,
        column: &SqlIdentifier,
        definition: &str,
    ) -> Result<(), BackendError>;

    /// Delete every row whose `last_seen` is strictly below `threshold`.
    /// Returns the number of deleted rows.
    async fn delete_last_seen_before(
        &mut self,
        table: &SqlIdentifier,
        threshold: &str,
    ) -> Result<u64, BackendError>;

    /// Gracefully terminate the connection.
    async fn close(self) -> Result<(), BackendError>;
}

/// Opens physical connections for a particular backend.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: AccountBackend;

    /// Human-readable backend name for log lines.
    fn backend_name(&self) -> &'static str;

    async fn open(&self, settings: &DatabaseSettings) -> Result<Self::Conn, ConnectError>;
}
