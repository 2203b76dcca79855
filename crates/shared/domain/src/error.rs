//! Domain-level errors.
//!
//! Value-level rule violations, independent of infrastructure concerns
//! (database, cache).

use thiserror::Error;

/// Domain-specific errors for business rule violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Validation failed for a field or input
    #[error("Validation error: {0}")]
    Validation(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_prefixed() {
        let err = DomainError::validation("confidence must be between 0 and 1");
        assert_eq!(err.to_string(), "Validation error: confidence must be between 0 and 1");
    }
}
