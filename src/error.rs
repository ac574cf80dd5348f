//! Error types for the admission guard service.

use thiserror::Error;

/// Main error type for process-level operations (startup, config, serving).
///
/// Per-request failures are modelled separately by
/// [`ValidationError`](crate::validation::ValidationError) and never surface here.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GuardError {
    fn from(err: config::ConfigError) -> Self {
        GuardError::Config(err.to_string())
    }
}

/// Result type alias for admission guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;
