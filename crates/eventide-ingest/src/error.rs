//! Error types for the ingestion pipeline.

use eventide_core::FieldError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// One rejected member of a bulk submission.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedEvent {
    /// Position of the event in the submitted array.
    pub index: usize,
    /// The submitted `source_id`, possibly empty.
    pub source_id: String,
    pub problems: Vec<FieldError>,
}

/// Errors that can occur during ingestion and querying.
#[derive(Error, Debug)]
pub enum Error {
    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Submission or filter validation error.
    #[error(transparent)]
    Validation(#[from] eventide_core::Error),

    /// A bulk submission had at least one invalid event.
    #[error("{} of the submitted events are invalid", .rejected.len())]
    InvalidBatch { rejected: Vec<RejectedEvent> },

    /// A backing service cannot be reached.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking store task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Errors worth retrying later: the backend may recover.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Redis(_) | Self::Unavailable(_) | Self::Io(_) | Self::Join(_) => true,
            Self::Sqlite(e) => sqlite_is_transient(e),
            _ => false,
        }
    }

    /// Errors caused by the caller's input rather than the system.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidBatch { .. })
    }
}

/// SQLite failures that can clear without the input changing. Constraint,
/// conversion and query errors repeat on every attempt.
fn sqlite_is_transient(e: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    match e {
        rusqlite::Error::SqliteFailure(err, _) => matches!(
            err.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
        ),
        _ => false,
    }
}
