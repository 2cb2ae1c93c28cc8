//! Error types for the glyscan core library.
//!
//! These cover infrastructure failures (storage, serialization, config).
//! Failures of the upstream collaborators (vision model, nutrition store) are
//! modelled separately in [`crate::taxonomy`] and never surface as
//! [`GlyscanError`].

use thiserror::Error;

/// Top-level error type for infrastructure operations.
#[derive(Error, Debug)]
pub enum GlyscanError {
    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for GlyscanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, GlyscanError>;
