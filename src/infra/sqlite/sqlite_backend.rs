// SQLite implementation of the connection ports.
//
// Same statements as the MySQL backend modulo dialect, so schema and purge
// behaviour can be exercised against a real SQL engine without a server.

use crate::core::config::{DatabaseSettings, SqlIdentifier};
use crate::core::connection::{AccountBackend, BackendError, ConnectError, Connector};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct SqliteConnector {
    options: SqliteConnectOptions,
    /// Number of successful opens.
    pub opened: Arc<AtomicUsize>,
}

impl SqliteConnector {
    /// Every open yields a fresh, empty in-memory database.
    pub fn in_memory() -> Self {
        Self {
            options: SqliteConnectOptions::new().create_if_missing(true),
            opened: Arc::default(),
        }
    }

    pub fn file(path: &Path) -> Self {
        Self {
            options: SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
            opened: Arc::default(),
        }
    }
}

fn backend_error(e: sqlx::Error) -> BackendError {
    match &e {
        sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => BackendError::ConnectionLost(e.to_string()),
        sqlx::Error::Database(db) if db.message().contains("duplicate column name") => {
            BackendError::DuplicateColumn(e.to_string())
        }
        _ => BackendError::Query(e.to_string()),
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    type Conn = SqliteConnection;

    fn backend_name(&self) -> &'static str {
        "SQLite"
    }

    async fn open(&self, _settings: &DatabaseSettings) -> Result<SqliteConnection, ConnectError> {
        let conn = self
            .options
            .connect()
            .await
            .map_err(|e| ConnectError::Network(e.to_string()))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(conn)
    }
}

#[async_trait]
impl AccountBackend for SqliteConnection {
    async fn ping(&mut self) -> Result<(), BackendError> {
        Connection::ping(self).await.map_err(backend_error)
    }

    async fn create_account_table(&mut self, table: &SqlIdentifier) -> Result<(), BackendError> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_uuid VARCHAR(50) NOT NULL UNIQUE,
                player_name VARCHAR(50) NOT NULL,
                money DECIMAL(30,2) NOT NULL,
                sync_complete VARCHAR(5) NOT NULL,
                last_seen VARCHAR(30) NOT NULL
            )
            "#
        );

        sqlx::query(&sql)
            .execute(&mut *self)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn column_exists(
        &mut self,
        table: &SqlIdentifier,
        column: &SqlIdentifier,
    ) -> Result<bool, BackendError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                .bind(table.as_str())
                .bind(column.as_str())
                .fetch_one(&mut *self)
                .await
                .map_err(backend_error)?;

        Ok(count > 0)
    }

    async fn add_column(
        &mut self,
        table: &SqlIdentifier,
        column: &SqlIdentifier,
        definition: &str,
    ) -> Result<(), BackendError> {
        let sql = format!(r#"ALTER TABLE "{table}" ADD COLUMN "{column}" {definition}"#);

        sqlx::query(&sql)
            .execute(&mut *self)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn delete_last_seen_before(
        &mut self,
        table: &SqlIdentifier,
        threshold: &str,
    ) -> Result<u64, BackendError> {
        let sql = format!(r#"DELETE FROM "{table}" WHERE last_seen < ?"#);

        let result = sqlx::query(&sql)
            .bind(threshold)
            .execute(&mut *self)
            .await
            .map_err(backend_error)?;
        Ok(result.rows_affected())
    }

    async fn close(self) -> Result<(), BackendError> {
        Connection::close(self).await.map_err(backend_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{
        MapConfig, KEY_KEEP_ALIVE, KEY_RETENTION_DELAY, KEY_RETENTION_ENABLED,
        KEY_RETENTION_INACTIVITY, KEY_TABLE,
    };
    use crate::core::connection::ConnectionManager;
    use crate::core::retention::{compute_threshold, purge_once, MILLIS_PER_DAY};
    use crate::core::schema::{ensure_column, ensure_table, ColumnOutcome};
    use crate::core::storage::StorageLayer;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn table() -> SqlIdentifier {
        SqlIdentifier::parse("eco_accounts").unwrap()
    }

    async fn memory_conn() -> SqliteConnection {
        SqliteConnectOptions::new()
            .create_if_missing(true)
            .connect()
            .await
            .unwrap()
    }

    async fn insert_account(conn: &mut SqliteConnection, uuid: &str, last_seen: i64) {
        sqlx::query(
            r#"
            INSERT INTO eco_accounts (player_uuid, player_name, money, sync_complete, last_seen)
            VALUES (?, ?, 100.00, 'true', ?)
            "#,
        )
        .bind(uuid)
        .bind(format!("player-{}", uuid))
        .bind(last_seen.to_string())
        .execute(&mut *conn)
        .await
        .unwrap();
    }

    async fn remaining_uuids(conn: &mut SqliteConnection) -> Vec<String> {
        sqlx::query_scalar("SELECT player_uuid FROM eco_accounts ORDER BY player_uuid")
            .fetch_all(&mut *conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_table_twice() {
        let mut conn = memory_conn().await;

        ensure_table(&mut conn, &table()).await.unwrap();
        ensure_table(&mut conn, &table()).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'eco_accounts'",
        )
        .fetch_one(&mut conn)
        .await
        .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn test_player_uuid_is_unique() {
        let mut conn = memory_conn().await;
        ensure_table(&mut conn, &table()).await.unwrap();
        insert_account(&mut conn, "a", 1).await;

        let duplicate = sqlx::query(
            "INSERT INTO eco_accounts (player_uuid, player_name, money, sync_complete, last_seen) \
             VALUES ('a', 'other', 0, 'true', '2')",
        )
        .execute(&mut conn)
        .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_legacy_table_gains_sync_complete() {
        let mut conn = memory_conn().await;
        sqlx::query(
            r#"
            CREATE TABLE eco_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_uuid VARCHAR(50) NOT NULL UNIQUE,
                player_name VARCHAR(50) NOT NULL,
                money DECIMAL(30,2) NOT NULL,
                last_seen VARCHAR(30) NOT NULL
            )
            "#,
        )
        .execute(&mut conn)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO eco_accounts (player_uuid, player_name, money, last_seen) \
             VALUES ('legacy', 'Old', 5, '1')",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        let column = SqlIdentifier::parse("sync_complete").unwrap();
        let definition = "VARCHAR(5) NOT NULL DEFAULT 'true'";

        let first = ensure_column(&mut conn, &table(), &column, definition).await.unwrap();
        let second = ensure_column(&mut conn, &table(), &column, definition).await.unwrap();
        assert_eq!(first, ColumnOutcome::Added);
        assert_eq!(second, ColumnOutcome::AlreadyPresent);

        let flag: String =
            sqlx::query_scalar("SELECT sync_complete FROM eco_accounts WHERE player_uuid = 'legacy'")
                .fetch_one(&mut conn)
                .await
                .unwrap();
        assert_eq!(flag, "true");
    }

    #[tokio::test]
    async fn test_duplicate_column_is_recognised() {
        let mut conn = memory_conn().await;
        ensure_table(&mut conn, &table()).await.unwrap();

        let column = SqlIdentifier::parse("last_seen").unwrap();
        let err = conn
            .add_column(&table(), &column, "VARCHAR(30) NOT NULL DEFAULT '0'")
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::DuplicateColumn(_)));
    }

    #[tokio::test]
    async fn test_purge_is_strictly_less_than() {
        let mut conn = memory_conn().await;
        ensure_table(&mut conn, &table()).await.unwrap();

        let threshold = compute_threshold(1_700_000_000_000, 30);
        insert_account(&mut conn, "a-older", threshold - 1).await;
        insert_account(&mut conn, "b-equal", threshold).await;
        insert_account(&mut conn, "c-newer", threshold + 1).await;
        insert_account(&mut conn, "d-ancient", threshold - 365 * MILLIS_PER_DAY).await;

        let deleted = purge_once(&mut conn, &table(), threshold).await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(remaining_uuids(&mut conn).await, vec!["b-equal", "c-newer"]);
    }

    #[tokio::test]
    async fn test_connect_bootstraps_table() {
        let connector = SqliteConnector::in_memory();
        let opened = Arc::clone(&connector.opened);
        let manager = ConnectionManager::new(connector, Arc::new(MapConfig::mysql_defaults()));

        let mut conn = manager.connect().await.unwrap();
        insert_account(&mut conn, "fresh", 1).await;
        drop(conn);

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(manager.acquire().await.is_ok());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_storage_layer_end_to_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("economy.db");

        // Seed a legacy table with one stale and one active account.
        let now = Utc::now().timestamp_millis();
        {
            let mut seed = SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true)
                .connect()
                .await
                .unwrap();
            sqlx::query(
                r#"
                CREATE TABLE players (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    player_uuid VARCHAR(50) NOT NULL UNIQUE,
                    player_name VARCHAR(50) NOT NULL,
                    money DECIMAL(30,2) NOT NULL,
                    last_seen VARCHAR(30) NOT NULL
                )
                "#,
            )
            .execute(&mut seed)
            .await
            .unwrap();
            for (uuid, last_seen) in [("stale", now - 40 * MILLIS_PER_DAY), ("active", now)] {
                sqlx::query(
                    "INSERT INTO players (player_uuid, player_name, money, last_seen) VALUES (?, ?, 1, ?)",
                )
                .bind(uuid)
                .bind(uuid)
                .bind(last_seen.to_string())
                .execute(&mut seed)
                .await
                .unwrap();
            }
            Connection::close(seed).await.unwrap();
        }

        let config = MapConfig::mysql_defaults()
            .with(KEY_TABLE, "players")
            .with(KEY_KEEP_ALIVE, "0")
            .with(KEY_RETENTION_ENABLED, "true")
            .with(KEY_RETENTION_INACTIVITY, "30")
            .with(KEY_RETENTION_DELAY, "0");

        let layer = StorageLayer::start(SqliteConnector::file(&path), Arc::new(config)).await;

        // The sweep runs on a background task; poll until it has landed.
        let mut remaining = Vec::new();
        for _ in 0..50 {
            let mut conn = layer.connections().acquire().await.unwrap();
            remaining = sqlx::query_scalar::<_, String>("SELECT player_uuid FROM players")
                .fetch_all(&mut *conn)
                .await
                .unwrap();
            drop(conn);
            if remaining.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(remaining, vec!["active".to_string()]);

        {
            let mut conn = layer.connections().acquire().await.unwrap();
            let flag: String = sqlx::query_scalar("SELECT sync_complete FROM players")
                .fetch_one(&mut *conn)
                .await
                .unwrap();
            assert_eq!(flag, "true");
        }

        layer.shutdown().await;
    }
}
