// Connection lifecycle - backend ports and the manager that keeps one
// connection alive.

mod backend;
mod connection_manager;

#[allow(unused_imports)]
pub use backend::{AccountBackend, BackendError, ConnectError, Connector, HealthStatus};
pub use connection_manager::ConnectionManager;

#[cfg(test)]
pub(crate) use connection_manager::tests as fake;
