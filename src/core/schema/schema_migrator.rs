// Schema migrator - brings the account table up to the current shape.
//
// There is no stored schema version. Each migration probes for its column and
// only ever adds structure, so the whole sequence can run on every startup and
// after a partially applied previous run.

use crate::core::config::{ConfigError, SqlIdentifier};
use crate::core::connection::{AccountBackend, BackendError, ConnectionManager, Connector};
use thiserror::Error;

// ============================================================================
// MIGRATIONS
// ============================================================================

/// One additive column migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMigration {
    pub column: &'static str,
    /// Column type and constraints. Must carry a default so existing rows
    /// stay valid.
    pub definition: &'static str,
}

/// Applied in this order; later entries may rely on earlier ones.
pub const ACCOUNT_COLUMN_MIGRATIONS: &[ColumnMigration] = &[ColumnMigration {
    column: "sync_complete",
    definition: "VARCHAR(5) NOT NULL DEFAULT 'true'",
}];

// ============================================================================
// ERRORS & OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Not connected to the database")]
    NotConnected,

    #[error(transparent)]
    Identifier(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOutcome {
    AlreadyPresent,
    Added,
    /// The probe said missing but the ALTER hit "duplicate column": another
    /// process added it in between. Same end state as `Added`.
    AddedConcurrently,
}

/// What a migration run did. Errors are already logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub table_ready: bool,
    pub added: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Create the account table if it does not exist. A no-op on an existing table.
pub async fn ensure_table<B: AccountBackend>(
    conn: &mut B,
    table: &SqlIdentifier,
) -> Result<(), SchemaError> {
    conn.create_account_table(table).await?;
    Ok(())
}

/// Add `column` with `definition` unless it already exists.
pub async fn ensure_column<B: AccountBackend>(
    conn: &mut B,
    table: &SqlIdentifier,
    column: &SqlIdentifier,
    definition: &str,
) -> Result<ColumnOutcome, SchemaError> {
    if conn.column_exists(table, column).await? {
        return Ok(ColumnOutcome::AlreadyPresent);
    }

    match conn.add_column(table, column, definition).await {
        Ok(()) => {
            tracing::info!(table = %table, column = %column, "Added column");
            Ok(ColumnOutcome::Added)
        }
        Err(BackendError::DuplicateColumn(msg)) => {
            tracing::warn!(
                table = %table,
                column = %column,
                "Column was added concurrently by another process: {}",
                msg
            );
            Ok(ColumnOutcome::AddedConcurrently)
        }
        Err(e) => Err(e.into()),
    }
}

/// Run `ensure_table` followed by every migration in `migrations`, in order.
///
/// Uses the already-established connection only. Failures are logged and
/// recorded in the report; nothing is propagated.
pub async fn run_migrations<C: Connector>(
    manager: &ConnectionManager<C>,
    table: &SqlIdentifier,
    migrations: &[ColumnMigration],
) -> MigrationReport {
    let mut report = MigrationReport::default();

    let Some(mut conn) = manager.current().await else {
        tracing::error!(table = %table, error = %SchemaError::NotConnected, "Skipping schema migration");
        return report;
    };

    if let Err(e) = ensure_table(&mut *conn, table).await {
        tracing::error!(table = %table, error = %e, "Could not create account table");
        return report;
    }
    report.table_ready = true;

    for migration in migrations {
        let outcome = match SqlIdentifier::parse(migration.column) {
            Ok(column) => ensure_column(&mut *conn, table, &column, migration.definition).await,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(ColumnOutcome::AlreadyPresent) => {}
            Ok(ColumnOutcome::Added) | Ok(ColumnOutcome::AddedConcurrently) => {
                report.added.push(migration.column);
            }
            Err(e) => {
                tracing::error!(table = %table, column = migration.column, error = %e, "Column migration failed");
                report.failed.push(migration.column);
            }
        }
    }

    tracing::info!(
        table = %table,
        added = report.added.len(),
        failed = report.failed.len(),
        "Schema migration finished"
    );
    report
}
