// Retention purge - deletes accounts that have been inactive for too long.

use crate::core::config::SqlIdentifier;
use crate::core::connection::{AccountBackend, BackendError, ConnectionManager, Connector};
use thiserror::Error;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurgeError {
    #[error("Not connected to the database")]
    NotConnected,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Cutoff timestamp: rows last seen strictly before it are stale.
pub fn compute_threshold(now_millis: i64, inactivity_days: u32) -> i64 {
    now_millis.saturating_sub(i64::from(inactivity_days) * MILLIS_PER_DAY)
}

/// Delete every row with `last_seen < threshold_millis`.
///
/// `last_seen` is stored as a decimal string, so the bound is bound as a
/// string too.
pub async fn purge_once<B: AccountBackend>(
    conn: &mut B,
    table: &SqlIdentifier,
    threshold_millis: i64,
) -> Result<u64, PurgeError> {
    let deleted = conn
        .delete_last_seen_before(table, &threshold_millis.to_string())
        .await?;
    Ok(deleted)
}

/// One maintenance sweep against the already-established connection.
pub async fn run_sweep<C: Connector>(
    manager: &ConnectionManager<C>,
    table: &SqlIdentifier,
    inactivity_days: u32,
    now_millis: i64,
) -> Result<u64, PurgeError> {
    let mut conn = manager.current().await.ok_or(PurgeError::NotConnected)?;
    let threshold = compute_threshold(now_millis, inactivity_days);

    tracing::info!(table = %table, threshold, "Database maintenance task started...");
    let deleted = purge_once(&mut *conn, table, threshold).await?;
    tracing::info!(table = %table, deleted, "Database maintenance complete!");

    Ok(deleted)
}
