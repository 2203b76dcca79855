//! Infrastructure layer: connection pool, migrations and transactions.

mod db;
pub mod migrations;
mod transaction;

pub use db::Database;
pub use migrations::Migrator;
pub use transaction::{TransactionContext, TransactionFuture, TransactionManager};
