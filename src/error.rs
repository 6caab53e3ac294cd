//! Error types for the Slidegate service.

use thiserror::Error;

/// Main error type for Slidegate operations.
#[derive(Error, Debug)]
pub enum SlidegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for SlidegateError {
    fn from(err: ::config::ConfigError) -> Self {
        SlidegateError::Config(err.to_string())
    }
}

/// Result type alias for Slidegate operations.
pub type Result<T> = std::result::Result<T, SlidegateError>;
