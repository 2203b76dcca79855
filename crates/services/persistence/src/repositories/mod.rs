//! Repository layer for data access.
//!
//! Every store borrows a connection (`&DatabaseConnection` or
//! `&DatabaseTransaction`), so the same code runs on the pool or inside a
//! transaction.

mod activity_log_repository;
mod agent_repository;
pub mod base;
pub mod entities;
mod insight_repository;
mod pattern_repository;
mod project_repository;
mod proposal_repository;
pub mod query;
mod task_repository;
mod user_repository;

pub use activity_log_repository::{ActivityLogRepository, ActivityLogStore, NewActivity};
pub use agent_repository::{AgentRepository, AgentStore};
pub use base::{
    CrudRepository, DeleteRepository, ReadRepository, RepositoryConnection, WriteRepository,
};
pub use insight_repository::{InsightRepository, InsightStore};
pub use pattern_repository::{PatternRepository, PatternStore};
pub use project_repository::{ProjectRepository, ProjectStore, ProjectWithTaskCount};
pub use proposal_repository::{ProposalRepository, ProposalStore};
pub use task_repository::{TaskRepository, TaskStore, TaskWithRelations};
pub use user_repository::{UserRepository, UserStore};

#[cfg(any(test, feature = "test-utils"))]
pub use activity_log_repository::MockActivityLogRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use agent_repository::MockAgentRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use insight_repository::MockInsightRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use pattern_repository::MockPatternRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use project_repository::MockProjectRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use proposal_repository::MockProposalRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use task_repository::MockTaskRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use user_repository::MockUserRepository;
