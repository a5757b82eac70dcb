// Storage configuration - typed settings resolved from a key/value provider.
//
// The provider itself is external (a plugin config file, environment, ...).
// This module only knows the key names and how to turn raw strings into
// validated settings.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// KEYS
// ============================================================================

pub const KEY_HOST: &str = "database.mysql.host";
pub const KEY_PORT: &str = "database.mysql.port";
pub const KEY_DATABASE: &str = "database.mysql.databaseName";
pub const KEY_USER: &str = "database.mysql.user";
pub const KEY_PASSWORD: &str = "database.mysql.password";
pub const KEY_TABLE: &str = "database.mysql.dataTableName";
pub const KEY_SSL: &str = "database.mysql.sslEnabled";
pub const KEY_CONNECT_TIMEOUT: &str = "database.mysql.connectTimeoutSeconds";
pub const KEY_KEEP_ALIVE: &str = "database.mysql.keepAliveSeconds";

pub const KEY_RETENTION_ENABLED: &str = "database.removeOldAccounts.enabled";
pub const KEY_RETENTION_INACTIVITY: &str = "database.removeOldAccounts.inactivity";
pub const KEY_RETENTION_DELAY: &str = "database.removeOldAccounts.startupDelaySeconds";
pub const KEY_RETENTION_INTERVAL: &str = "database.removeOldAccounts.intervalHours";

const DEFAULT_PORT: u16 = 3306;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
// 2000 server ticks at 20 ticks per second.
const DEFAULT_PURGE_DELAY_SECS: u64 = 100;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing configuration key: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),
}

// ============================================================================
// PROVIDER TRAIT (PORT)
// ============================================================================

/// Read-only key/value configuration source.
///
/// Implementors only need `get_string`; typed lookups parse on top of it so
/// every provider reports malformed values the same way.
pub trait ConfigProvider: Send + Sync {
    /// Raw value for `key`, or `None` if the key is not set.
    fn get_string(&self, key: &str) -> Option<String>;

    fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.get_string(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid {
                    key: key.to_string(),
                    value: raw,
                }),
        }
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get_string(key) {
            None => Ok(None),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value: raw,
                }),
            },
        }
    }
}

fn require(provider: &dyn ConfigProvider, key: &str) -> Result<String, ConfigError> {
    provider
        .get_string(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn non_negative(provider: &dyn ConfigProvider, key: &str, default: u64) -> Result<u64, ConfigError> {
    match provider.get_int(key)? {
        None => Ok(default),
        Some(v) => u64::try_from(v).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: v.to_string(),
        }),
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// A table or column name that is safe to interpolate into SQL.
///
/// Placeholders cannot bind identifiers, so names coming from configuration
/// are checked against `[A-Za-z_][A-Za-z0-9_]{0,63}` instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlIdentifier(String);

impl SqlIdentifier {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid_start && valid_rest && name.len() <= 64 {
            Ok(Self(name.to_string()))
        } else {
            Err(ConfigError::InvalidIdentifier(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// DATABASE SETTINGS
// ============================================================================

#[derive(Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub table: SqlIdentifier,
    pub ssl_enabled: bool,
    pub connect_timeout: Duration,
    /// `None` disables the keep-alive heartbeat.
    pub keep_alive: Option<Duration>,
}

// Hand-written so the password never ends up in a log line.
impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("table", &self.table)
            .field("ssl_enabled", &self.ssl_enabled)
            .field("connect_timeout", &self.connect_timeout)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

impl DatabaseSettings {
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        let port = match provider.get_int(KEY_PORT)? {
            None => DEFAULT_PORT,
            Some(p) => u16::try_from(p).map_err(|_| ConfigError::Invalid {
                key: KEY_PORT.to_string(),
                value: p.to_string(),
            })?,
        };

        let keep_alive_secs = non_negative(provider, KEY_KEEP_ALIVE, DEFAULT_KEEP_ALIVE_SECS)?;

        Ok(Self {
            host: require(provider, KEY_HOST)?,
            port,
            database: require(provider, KEY_DATABASE)?,
            user: require(provider, KEY_USER)?,
            password: provider.get_string(KEY_PASSWORD).unwrap_or_default(),
            table: SqlIdentifier::parse(require(provider, KEY_TABLE)?.trim())?,
            ssl_enabled: provider.get_bool(KEY_SSL)?.unwrap_or(false),
            connect_timeout: Duration::from_secs(
                non_negative(provider, KEY_CONNECT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT_SECS)?.max(1),
            ),
            keep_alive: (keep_alive_secs > 0).then(|| Duration::from_secs(keep_alive_secs)),
        })
    }
}

// ============================================================================
// RETENTION SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionSettings {
    pub inactivity_days: u32,
    pub startup_delay: Duration,
    /// `None` means the sweep runs once.
    pub repeat_every: Option<Duration>,
}

impl RetentionSettings {
    /// Returns `Ok(None)` when retention is disabled.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Option<Self>, ConfigError> {
        if !provider.get_bool(KEY_RETENTION_ENABLED)?.unwrap_or(false) {
            return Ok(None);
        }

        let raw_days = provider
            .get_int(KEY_RETENTION_INACTIVITY)?
            .ok_or_else(|| ConfigError::Missing(KEY_RETENTION_INACTIVITY.to_string()))?;
        let inactivity_days = u32::try_from(raw_days)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| ConfigError::Invalid {
                key: KEY_RETENTION_INACTIVITY.to_string(),
                value: raw_days.to_string(),
            })?;

        let delay_secs = non_negative(provider, KEY_RETENTION_DELAY, DEFAULT_PURGE_DELAY_SECS)?;
        let interval_hours = non_negative(provider, KEY_RETENTION_INTERVAL, 0)?;
        let interval_secs = interval_hours
            .checked_mul(3600)
            .ok_or_else(|| ConfigError::Invalid {
                key: KEY_RETENTION_INTERVAL.to_string(),
                value: interval_hours.to_string(),
            })?;

        Ok(Some(Self {
            inactivity_days,
            startup_delay: Duration::from_secs(delay_secs),
            repeat_every: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
        }))
    }
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

/// In-memory provider for tests.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MapConfig {
    values: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// Minimal valid MySQL settings.
    pub fn mysql_defaults() -> Self {
        Self::new()
            .with(KEY_HOST, "localhost")
            .with(KEY_DATABASE, "minecraft")
            .with(KEY_USER, "eco")
            .with(KEY_PASSWORD, "secret")
            .with(KEY_TABLE, "eco_accounts")
    }
}

#[cfg(test)]
impl ConfigProvider for MapConfig {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
