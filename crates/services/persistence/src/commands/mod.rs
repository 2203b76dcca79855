//! CLI command implementations, one module per command.

pub mod cleanup;
pub mod health;
pub mod migrate;
pub mod stats;
