//! Error types for the storage layer.

use thiserror::Error;

/// Storage operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Storage errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A stored row violates a structural invariant. Never repaired in
    /// place; the caller fails closed.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl DbError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether retrying the enclosing transaction can succeed.
    ///
    /// Serialization failures (40001), deadlocks (40P01), connection
    /// loss (class 08) and operator interventions (class 57) are
    /// transient; everything else is treated as permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Io(_))
            | DbError::Sqlx(sqlx::Error::PoolTimedOut)
            | DbError::Sqlx(sqlx::Error::PoolClosed) => true,
            DbError::Sqlx(sqlx::Error::Database(db)) => match db.code() {
                Some(code) => {
                    code == "40001"
                        || code == "40P01"
                        || code.starts_with("08")
                        || code.starts_with("57")
                }
                None => false,
            },
            _ => false,
        }
    }
}
