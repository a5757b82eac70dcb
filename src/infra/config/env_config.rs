// Environment-backed configuration provider.
//
// Dotted keys map to upper-case environment variables:
// `database.mysql.dataTableName` -> `DATABASE_MYSQL_DATATABLENAME`.
// `.env` files are loaded by main before this is used.

use crate::core::config::ConfigProvider;

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfigProvider;

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn env_key(key: &str) -> String {
        key.replace('.', "_").to_ascii_uppercase()
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Option<String> {
        std::env::var(Self::env_key(key)).ok()
    }
}
