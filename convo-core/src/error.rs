//! Error types for convo

use thiserror::Error;

/// The main error type for convo operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage layer errors (I/O, corruption, constraint violations)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Session management errors
    #[error("Session error: {0}")]
    Session(String),

    /// Provider (LLM) errors
    #[error("Provider error: {0}")]
    Provider(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for convo operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error reports a missing entity rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
