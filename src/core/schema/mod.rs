// Schema migration for the account table.

mod schema_migrator;

pub use schema_migrator::{run_migrations, ACCOUNT_COLUMN_MIGRATIONS};

#[allow(unused_imports)]
pub use schema_migrator::{ensure_column, ensure_table, ColumnOutcome};
