// MySQL backend - the production store.

mod mysql_backend;

pub use mysql_backend::MySqlConnector;
