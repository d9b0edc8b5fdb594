//! Error types for the rotation lock settings system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for rotation lock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the rotation lock settings system
#[derive(Error, Debug)]
pub enum Error {
    /// Settings store-related errors
    #[error("settings store error: {0}")]
    Store(String),

    /// Persisted settings that cannot be decoded
    #[error("corrupt persisted settings: {0}")]
    CorruptSettings(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors from file-backed stores
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a settings store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a corrupt-settings error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptSettings(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
