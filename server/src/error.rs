use thiserror::Error;

/// Errors surfaced by the permission engine and the chat core.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored state violates an invariant (e.g. a user holding two tiers).
    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type AccessResult<T> = Result<T, AccessError>;

impl AccessError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    /// Storage failures that may succeed when retried: a locked database,
    /// an exhausted pool, or an I/O hiccup.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(sqlx::Error::PoolTimedOut) | Self::Storage(sqlx::Error::Io(_)) => true,
            Self::Storage(sqlx::Error::Database(db)) => {
                // SQLITE_BUSY (5) / SQLITE_LOCKED (6), including extended codes
                db.code()
                    .and_then(|c| c.parse::<i32>().ok())
                    .is_some_and(|code| matches!(code & 0xff, 5 | 6))
            }
            _ => false,
        }
    }
}

/// Whether a database error is a UNIQUE / PRIMARY KEY violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
