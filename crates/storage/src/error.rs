use thiserror::Error;

/// Postgres SQLSTATE codes raised when a transaction lost a lock race.
const RETRYABLE_CODES: [&str; 3] = [
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] validator::ValidationErrors),

    #[error("{field} must be between 1 and {max}")]
    PositionOutOfRange { field: &'static str, max: i32 },

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Conflicting update, retry the request: {0}")]
    ConflictRetryable(sqlx::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        let retryable = matches!(
            &error,
            sqlx::Error::Database(e)
                if e.code().is_some_and(|code| RETRYABLE_CODES.contains(&code.as_ref()))
        );

        if retryable {
            StorageError::ConflictRetryable(error)
        } else {
            StorageError::Database(error)
        }
    }
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::Database(e))
                if e.code().as_deref() == Some("23505")
        )
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::Database(e))
                if e.code().as_deref() == Some("23503")
        )
    }

    /// Whether the caller may safely re-issue the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::ConflictRetryable(_))
    }
}
