//! Error types for the tracker_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tracker_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A row that was expected to exist is missing
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Invalid operation on the active workout session
    #[error("Session error: {0}")]
    Session(String),

    /// Malformed import payload
    #[error("Import error: {0}")]
    Import(String),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// Internal state error (poisoned lock, unreadable stored value)
    #[error("State error: {0}")]
    State(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Task(e.to_string())
    }
}
