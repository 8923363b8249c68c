//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("transaction conflict, retry")]
    SerializationConflict,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Classify a raw `sqlx::Error` into the richer variants repository
    /// functions want to match on, without losing the underlying error.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            // Postgres SQLSTATE 23505 = unique_violation, 40001 = serialization_failure.
            match db_err.code().as_deref() {
                Some("23505") => return DbError::UniqueViolation(db_err.message().to_string()),
                Some("40001") => return DbError::SerializationConflict,
                _ => {}
            }
        }
        DbError::Sqlx(err)
    }

    /// Whether the caller may retry the transaction that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::SerializationConflict)
    }
}
