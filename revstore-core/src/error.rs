//! Error types for revstore-core

use thiserror::Error;

/// Main error type for the revstore-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed request input (bad tags, bad JSON, missing confirmation)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Object, revision, or mapping absent; the message is client-facing
    #[error("{0}")]
    NotFound(String),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for revstore-core
pub type Result<T> = std::result::Result<T, Error>;
