// The infra module contains implementations of core traits.
// Each backend goes in its own submodule.

#[path = "config/env_config.rs"]
pub mod config;

#[path = "mysql/mod.rs"]
pub mod mysql;

#[cfg(test)]
#[path = "sqlite/mod.rs"]
pub mod sqlite;
