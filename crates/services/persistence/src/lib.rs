//! Persistence layer for the project/task platform.
//!
//! This crate provides:
//! - SeaORM entities and migrations for every table
//! - Repositories with filtered queries, search, statistics and trends
//! - Memory, Redis and no-op caches
//! - Transactions and the [`RepositoryManager`] facade
//! - The `persistence` maintenance CLI

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod infra;
pub mod manager;
pub mod repositories;
pub mod types;

pub use cache::{CacheExt, CacheManager, CacheStats};
pub use config::Config;
pub use infra::{Database, Migrator, TransactionContext, TransactionManager};
pub use manager::{BatchOperation, CleanupReport, ManagerStats, RepositoryManager};
pub use types::{Filter, Paginated, Pagination, SortOrder};
