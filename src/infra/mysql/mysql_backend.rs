// MySQL implementation of the connection ports.

use crate::core::config::{DatabaseSettings, SqlIdentifier};
use crate::core::connection::{AccountBackend, BackendError, ConnectError, Connector};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlSslMode};
use sqlx::{ConnectOptions, Connection};

/// ER_DUP_FIELDNAME
const DUPLICATE_COLUMN_ERROR: u16 = 1060;

#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

fn connect_options(settings: &DatabaseSettings) -> MySqlConnectOptions {
    let ssl_mode = if settings.ssl_enabled {
        MySqlSslMode::Required
    } else {
        MySqlSslMode::Disabled
    };

    MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .database(&settings.database)
        .username(&settings.user)
        .password(&settings.password)
        .ssl_mode(ssl_mode)
        .charset("utf8mb4")
        .collation("utf8mb4_unicode_ci")
}

/// Sort a failed connection attempt into the layer's error taxonomy.
fn classify_connect_error(e: sqlx::Error) -> ConnectError {
    match &e {
        sqlx::Error::Configuration(_) | sqlx::Error::Tls(_) => ConnectError::DriverMissing(e.to_string()),
        // The server answered: bad credentials, unknown database, too many connections.
        sqlx::Error::Database(_) => ConnectError::ConnectionRefused(e.to_string()),
        _ => ConnectError::Network(e.to_string()),
    }
}

fn backend_error(e: sqlx::Error) -> BackendError {
    match &e {
        sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => BackendError::ConnectionLost(e.to_string()),
        sqlx::Error::Database(db)
            if db
                .try_downcast_ref::<MySqlDatabaseError>()
                .is_some_and(|m| m.number() == DUPLICATE_COLUMN_ERROR) =>
        {
            BackendError::DuplicateColumn(e.to_string())
        }
        _ => BackendError::Query(e.to_string()),
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlConnection;

    fn backend_name(&self) -> &'static str {
        "MySQL"
    }

    async fn open(&self, settings: &DatabaseSettings) -> Result<MySqlConnection, ConnectError> {
        connect_options(settings)
            .connect()
            .await
            .map_err(classify_connect_error)
    }
}

#[async_trait]
impl AccountBackend for MySqlConnection {
    async fn ping(&mut self) -> Result<(), BackendError> {
        Connection::ping(self).await.map_err(backend_error)
    }

    async fn create_account_table(&mut self, table: &SqlIdentifier) -> Result<(), BackendError> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS `{table}` (
                id INT(10) NOT NULL AUTO_INCREMENT,
                player_uuid VARCHAR(50) NOT NULL UNIQUE,
                player_name VARCHAR(50) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci NOT NULL,
                money DECIMAL(30,2) NOT NULL,
                sync_complete VARCHAR(5) NOT NULL,
                last_seen VARCHAR(30) NOT NULL,
                PRIMARY KEY (id)
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
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?
            "#,
        )
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
        let sql = format!("ALTER TABLE `{table}` ADD COLUMN `{column}` {definition}");

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
        let sql = format!("DELETE FROM `{table}` WHERE `last_seen` < ?");

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
    use crate::core::config::{MapConfig, KEY_CONNECT_TIMEOUT, KEY_PORT};
    use crate::core::connection::ConnectionManager;
    use std::io;
    use std::sync::Arc;

    #[test]
    fn test_connect_error_classification() {
        let driver = classify_connect_error(sqlx::Error::Configuration("unsupported option".into()));
        assert!(matches!(driver, ConnectError::DriverMissing(_)));

        let network = classify_connect_error(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(matches!(network, ConnectError::Network(_)));
    }

    #[test]
    fn test_lost_socket_is_connection_lost() {
        let err = backend_error(sqlx::Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe")));
        assert!(matches!(err, BackendError::ConnectionLost(_)));

        let err = backend_error(sqlx::Error::WorkerCrashed);
        assert!(matches!(err, BackendError::ConnectionLost(_)));

        let err = backend_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, BackendError::Query(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_network_error() {
        // Nothing listens on port 1 locally, so the attempt is refused at once.
        let config = MapConfig::mysql_defaults()
            .with(KEY_PORT, "1")
            .with(KEY_CONNECT_TIMEOUT, "2");
        let manager = ConnectionManager::new(MySqlConnector::new(), Arc::new(config));

        let err = manager.acquire().await.unwrap_err();

        assert!(matches!(err, ConnectError::Network(_)));
        assert_eq!(manager.stats().await.failures, 1);
    }
}
