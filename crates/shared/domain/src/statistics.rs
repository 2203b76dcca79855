//! Aggregate shapes returned by statistics and trend queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counts keyed by a text column (status, type, priority, ...)
pub type CountBuckets = BTreeMap<String, u64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStatistics {
    pub user_id: Uuid,
    pub projects_created: u64,
    pub tasks_assigned: u64,
    pub tasks_completed: u64,
    pub proposals_submitted: u64,
    /// Activities logged within the recent window
    pub recent_activities: u64,
    /// Completed share of assigned tasks, in percent
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatistics {
    pub project_id: Uuid,
    pub total_tasks: u64,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
    pub total_proposals: u64,
    pub pending_proposals: u64,
    pub approved_proposals: u64,
    pub rejected_proposals: u64,
    pub pattern_count: u64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub total: u64,
    pub by_status: CountBuckets,
    pub by_priority: CountBuckets,
}

/// Per-agent task counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentTaskCounts {
    pub total_tasks: u64,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatistics {
    pub id: Uuid,
    pub name: String,
    pub agent_type: String,
    pub status: String,
    pub task_count: i32,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub created_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
    /// Seconds since `last_active`, when known
    pub idle_seconds: Option<i64>,
    pub task_statistics: AgentTaskCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentWorkload {
    pub task_counts: CountBuckets,
    pub total_tasks: u64,
    /// Tasks in progress or assigned
    pub current_load: u64,
    /// Tasks pending or queued
    pub pending_load: u64,
    pub avg_completion_time_minutes: f64,
    pub estimated_remaining_minutes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposalStatistics {
    pub total: u64,
    pub by_status: CountBuckets,
    pub by_category: CountBuckets,
    pub by_priority: CountBuckets,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternStatistics {
    pub total: u64,
    pub by_type: CountBuckets,
    pub avg_confidence: f64,
    pub avg_significance: f64,
    pub avg_frequency: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightStatistics {
    pub total: u64,
    pub by_type: CountBuckets,
    pub by_impact: CountBuckets,
    pub actionable: u64,
    pub non_actionable: u64,
    pub implemented: u64,
    pub not_implemented: u64,
    pub avg_confidence: f64,
    /// Implemented share of all insights, in percent
    pub implementation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightEffectiveness {
    pub id: Uuid,
    pub title: String,
    pub insight_type: String,
    pub impact: String,
    pub confidence: f64,
    pub is_actionable: bool,
    pub is_implemented: bool,
    pub created_at: DateTime<Utc>,
    /// Seconds from creation until the insight was marked implemented
    pub time_to_implementation_seconds: Option<i64>,
    pub pattern_confidence: Option<f64>,
    /// Insight confidence multiplied by the source pattern's confidence
    pub pattern_correlation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserActivityStats {
    pub user_id: Uuid,
    pub total_activities: u64,
    pub successful_actions: u64,
    pub failed_actions: u64,
    pub success_rate: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemActivityStats {
    pub total_activities: u64,
    pub successful_actions: u64,
    pub failed_actions: u64,
    pub unique_users: u64,
    pub today_activities: u64,
    pub success_rate: f64,
}

/// One bucket of a time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTrendPoint {
    pub bucket: DateTime<Utc>,
    pub count: u64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightTrendPoint {
    pub bucket: DateTime<Utc>,
    pub created: u64,
    pub implemented: u64,
}
