//! Command-line interface for persistence maintenance.
//!
//! Provides commands for:
//! - `migrate` - Schema migrations
//! - `health` - Database and repository checks
//! - `stats` - Row counts and cache usage
//! - `cleanup` - Retention-based data removal

pub mod args;

pub use args::{Cli, Commands};
