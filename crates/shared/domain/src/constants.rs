//! Domain-level constants.
//!
//! These constants define business rules shared by every repository.

// =============================================================================
// User Roles
// =============================================================================

/// Default role assigned to new users
pub const ROLE_USER: &str = "user";

/// Administrator role with elevated privileges
pub const ROLE_ADMIN: &str = "admin";

/// All valid role values
pub const VALID_ROLES: &[&str] = &[ROLE_USER, ROLE_ADMIN];

/// Check if a role value is valid
pub fn is_valid_role(role: &str) -> bool {
    VALID_ROLES.contains(&role)
}

// =============================================================================
// Progress & Scores
// =============================================================================

/// Lowest accepted progress percentage
pub const MIN_PROGRESS: i32 = 0;

/// Highest accepted progress percentage
pub const MAX_PROGRESS: i32 = 100;

/// Upper bound for confidence scores (patterns, insights)
pub const MAX_CONFIDENCE: f64 = 1.0;

/// Upper bound for agent success rates, expressed as a percentage
pub const MAX_SUCCESS_RATE: f64 = 100.0;

/// Check that a progress value lies within 0..=100
pub fn is_valid_progress(progress: i32) -> bool {
    (MIN_PROGRESS..=MAX_PROGRESS).contains(&progress)
}

/// Check that a confidence value lies within 0.0..=1.0
pub fn is_valid_confidence(confidence: f64) -> bool {
    (0.0..=MAX_CONFIDENCE).contains(&confidence)
}

// =============================================================================
// Time Windows
// =============================================================================

/// Tasks older than this many days that are still open count as overdue
pub const TASK_OVERDUE_DAYS: i64 = 7;

/// Window used for "recent activity" counters in user statistics
pub const RECENT_ACTIVITY_DAYS: i64 = 30;

/// Default retention for activity logs before cleanup
pub const DEFAULT_ACTIVITY_LOG_RETENTION_DAYS: i64 = 30;

/// Number of buckets returned by trend queries
pub const TREND_BUCKET_LIMIT: u64 = 30;

// =============================================================================
// Similarity
// =============================================================================

/// Confidence distance under which two patterns of the same type are similar
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.1;

/// Maximum number of similar patterns returned
pub const MAX_SIMILAR_PATTERNS: u64 = 10;

/// Compute a percentage, returning 0 when the denominator is 0
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_guards_zero_total() {
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }

    #[test]
    fn progress_bounds() {
        assert!(is_valid_progress(0));
        assert!(is_valid_progress(100));
        assert!(!is_valid_progress(-1));
        assert!(!is_valid_progress(101));
    }

    #[test]
    fn confidence_bounds() {
        assert!(is_valid_confidence(0.5));
        assert!(!is_valid_confidence(1.2));
    }
}
