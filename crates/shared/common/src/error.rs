//! Unified error handling.
//!
//! A single error type for repositories, caches, transactions and the
//! maintenance CLI. Infrastructure variants are feature gated so crates
//! that only need the vocabulary do not pull in sea-orm or redis.

use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Resource not found")]
    NotFound,

    #[error("{0} already exists")]
    Conflict(String),

    // Validation
    #[error("{0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    BadRequest(String),

    // External service errors
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[cfg(feature = "cache")]
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Batch execution
    #[error("batch operation {index} failed: {source}")]
    BatchOperation {
        index: usize,
        #[source]
        source: Box<AppError>,
    },

    #[error("{0} not implemented")]
    NotImplemented(String),

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for logs and callers
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            #[cfg(feature = "cache")]
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::BatchOperation { .. } => "BATCH_OPERATION_FAILED",
            AppError::NotImplemented(_) => "NOT_IMPLEMENTED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors caused by caller input rather than infrastructure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::NotFound
                | AppError::Conflict(_)
                | AppError::Validation(_)
                | AppError::BadRequest(_)
        )
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Convenience constructors
impl AppError {
    pub fn conflict(entity: impl Into<String>) -> Self {
        AppError::Conflict(entity.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn not_implemented(feature: impl Into<String>) -> Self {
        AppError::NotImplemented(feature.into())
    }

    pub fn batch(index: usize, source: AppError) -> Self {
        AppError::BatchOperation {
            index,
            source: Box::new(source),
        }
    }
}
