//! Error types for the Carewarden service.

use thiserror::Error;

/// Main error type for Carewarden operations.
///
/// Request denials are not errors in this sense; see
/// [`Denial`](crate::governance::Denial).
#[derive(Error, Debug)]
pub enum CarewardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed rate limit rule
    #[error("Invalid rate limit rule: {0}")]
    Rule(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for CarewardenError {
    fn from(err: config::ConfigError) -> Self {
        CarewardenError::Config(err.to_string())
    }
}

/// Result type alias for Carewarden operations.
pub type Result<T> = std::result::Result<T, CarewardenError>;
