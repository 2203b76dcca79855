//! Status, type and priority vocabularies.
//!
//! Values are stored as plain text columns; these enums give callers a typed
//! way to build filters and validate input before it reaches the database.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All variants in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stored text representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(DomainError::validation(format!(
                        "invalid {}: {}",
                        $label, other
                    ))),
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

text_enum! {
    /// Lifecycle of a project
    ProjectStatus, "project status" {
        Active => "active",
        Completed => "completed",
        Paused => "paused",
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Kind of work a project represents
    ProjectType, "project type" {
        Research => "research",
        Development => "development",
        Analysis => "analysis",
        Innovation => "innovation",
    }
}

text_enum! {
    /// Priority shared by projects, tasks and proposals
    Priority, "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

text_enum! {
    /// Lifecycle of a task
    TaskStatus, "task status" {
        Pending => "pending",
        Queued => "queued",
        Assigned => "assigned",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Availability of an agent
    AgentStatus, "agent status" {
        Active => "active",
        Inactive => "inactive",
        Busy => "busy",
        Error => "error",
    }
}

text_enum! {
    /// Review state of a proposal
    ProposalStatus, "proposal status" {
        Pending => "pending",
        UnderReview => "under_review",
        Approved => "approved",
        Rejected => "rejected",
    }
}

text_enum! {
    /// Expected impact of an insight
    InsightImpact, "insight impact" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl TaskStatus {
    /// Closed tasks are never overdue
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// Bucket width used by trend aggregation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPeriod {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl TrendPeriod {
    /// Unit passed to `DATE_TRUNC`
    pub fn trunc_unit(&self) -> &'static str {
        match self {
            TrendPeriod::Daily => "day",
            TrendPeriod::Weekly => "week",
            TrendPeriod::Monthly => "month",
        }
    }
}

impl fmt::Display for TrendPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendPeriod::Daily => f.write_str("daily"),
            TrendPeriod::Weekly => f.write_str("weekly"),
            TrendPeriod::Monthly => f.write_str("monthly"),
        }
    }
}

impl FromStr for TrendPeriod {
    type Err = DomainError;

    /// Accepts both `daily` and `day` spellings; empty input means daily.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "daily" | "day" => Ok(TrendPeriod::Daily),
            "weekly" | "week" => Ok(TrendPeriod::Weekly),
            "monthly" | "month" => Ok(TrendPeriod::Monthly),
            other => Err(DomainError::validation(format!("invalid period: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trips_through_text() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "archived".parse::<ProjectStatus>().unwrap_err();
        assert_eq!(err, DomainError::validation("invalid project status: archived"));
    }

    #[test]
    fn proposal_status_uses_snake_case() {
        assert_eq!(ProposalStatus::UnderReview.to_string(), "under_review");
        let json = serde_json::to_string(&ProposalStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");
    }

    #[test]
    fn trend_period_accepts_short_aliases() {
        assert_eq!("week".parse::<TrendPeriod>().unwrap(), TrendPeriod::Weekly);
        assert_eq!("".parse::<TrendPeriod>().unwrap(), TrendPeriod::Daily);
        assert_eq!(TrendPeriod::Monthly.trunc_unit(), "month");
        assert!("hourly".parse::<TrendPeriod>().is_err());
    }

    #[test]
    fn closed_task_statuses() {
        assert!(TaskStatus::Completed.is_closed());
        assert!(TaskStatus::Cancelled.is_closed());
        assert!(!TaskStatus::Failed.is_closed());
    }
}
