// The core module contains the storage-access logic and the ports (traits)
// the infra layer implements. Nothing in here knows which database it talks to.

#[path = "config/mod.rs"]
pub mod config;

#[path = "connection/mod.rs"]
pub mod connection;

#[path = "schema/mod.rs"]
pub mod schema;

#[path = "retention/mod.rs"]
pub mod retention;

#[path = "storage/mod.rs"]
pub mod storage;
