//! Error types shared by the repositories of every service

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Postgres SQLSTATE for a unique constraint violation
const UNIQUE_VIOLATION: &str = "23505";

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The pool could not be established
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    #[error("Database query error: {0}")]
    Query(#[from] SqlxError),

    #[error("Database migration error: {0}")]
    Migration(String),

    /// Missing or invalid connection settings
    #[error("Database configuration error: {0}")]
    Configuration(String),

    /// A stored value could not be mapped to or from its domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl DatabaseError {
    /// True when the query was refused by a unique index, e.g. a second
    /// account racing for the same e-mail
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Query(SqlxError::Database(db)) => {
                db.code().as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
