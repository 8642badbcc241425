//! Error types for the urwa core.
//!
//! Scrape-path failures are data (`FailureKind` inside outcomes and
//! results); `UrwaError` covers construction, configuration, and IO
//! plumbing failures only.

use thiserror::Error;

/// Result type alias using UrwaError
pub type Result<T> = std::result::Result<T, UrwaError>;

#[derive(Error, Debug)]
pub enum UrwaError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// HTTP client construction or plumbing failure
    #[error("HTTP client error: {0}")]
    Http(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistent state (journal, evidence) failure
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Generic internal error
    #[error("{0}")]
    Internal(String),
}

impl UrwaError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        UrwaError::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        UrwaError::Internal(msg.into())
    }
}
