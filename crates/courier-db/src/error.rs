use thiserror::Error;
use uuid::Uuid;

/// Storage-layer failures, typed so callers can distinguish ownership and
/// existence errors from genuine faults.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username already taken: {0}")]
    DuplicateUsername(String),

    #[error("no such user: {0}")]
    UnknownUser(String),

    #[error("no such message: {0}")]
    UnknownMessage(Uuid),

    #[error("message {0} is already marked read")]
    AlreadyRead(Uuid),

    #[error("database lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
