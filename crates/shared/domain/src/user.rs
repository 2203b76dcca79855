//! User roles and account lock rules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{ROLE_ADMIN, ROLE_USER};

/// User roles enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    /// Check if this role has admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Stored text representation
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => ROLE_ADMIN,
            UserRole::User => ROLE_USER,
        }
    }
}

impl From<&str> for UserRole {
    fn from(s: &str) -> Self {
        match s {
            ROLE_ADMIN => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

impl From<String> for UserRole {
    fn from(s: String) -> Self {
        UserRole::from(s.as_str())
    }
}

impl From<UserRole> for String {
    fn from(role: UserRole) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moment at which a lock placed now for `duration` expires
pub fn lock_expiry(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    now + duration
}

/// An account is locked while `locked_until` lies in the future
pub fn is_locked(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    locked_until.is_some_and(|until| until > now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_defaults_to_user() {
        assert_eq!(UserRole::from("superuser"), UserRole::User);
        assert_eq!(UserRole::from("admin"), UserRole::Admin);
        assert_eq!(String::from(UserRole::Admin), "admin");
    }

    #[test]
    fn lock_is_active_only_until_expiry() {
        let now = Utc::now();
        let until = lock_expiry(now, Duration::minutes(15));

        assert!(is_locked(Some(until), now));
        assert!(!is_locked(Some(until), until + Duration::seconds(1)));
        assert!(!is_locked(None, now));
    }
}
