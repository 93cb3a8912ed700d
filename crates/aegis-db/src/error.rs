use thiserror::Error;

/// Store-level error taxonomy. Handlers map these onto HTTP statuses;
/// the dispatcher treats them all as internal faults.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("trusted contact limit reached (max 3 active)")]
    CapacityExceeded,

    #[error("alert is no longer active")]
    InvalidTransition,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
