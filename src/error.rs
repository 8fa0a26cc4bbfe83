//! Error types for CortexPool

use thiserror::Error;

/// Result type alias for CortexPool operations
pub type Result<T> = std::result::Result<T, CortexError>;

/// Main error type for CortexPool
#[derive(Error, Debug)]
pub enum CortexError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Vector backend error: {0}")]
    Vector(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "remote-vectors")]
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CortexError {
    /// Vector errors are recovered internally; everything else surfaces.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CortexError::Vector(_))
    }
}
