use sea_orm::error::DbErr;
use thiserror::Error;

/// Error taxonomy shared by every service in the crate.
///
/// Per-component shortages are never errors — they are reported as data in
/// the calculation results so callers always get a complete picture. Errors
/// are reserved for structural problems: missing rows, cross-tenant
/// references, misconfigured products, and mutations that would violate the
/// non-negative stock invariant.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    /// Normalizes database errors at call sites using `map_err`.
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// True when retrying the same call cannot succeed without a data or
    /// configuration change.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_)
                | ServiceError::ValidationError(_)
                | ServiceError::InsufficientStock(_)
                | ServiceError::ConfigurationError(_)
                | ServiceError::InvalidOperation(_)
        )
    }
}
