//! Domain layer - platform vocabulary and value types.
//!
//! This crate holds the status vocabularies, business constants and
//! statistics shapes shared by the persistence layer and its consumers.
//! It has no database or cache dependencies.

pub mod constants;
pub mod error;
pub mod statistics;
pub mod status;
pub mod user;

pub use constants::*;
pub use error::DomainError;
pub use statistics::*;
pub use status::{
    AgentStatus, InsightImpact, Priority, ProjectStatus, ProjectType, ProposalStatus, TaskStatus,
    TrendPeriod,
};
pub use user::{is_locked, lock_expiry, UserRole};
