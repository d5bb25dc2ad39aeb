//! Error types for the relay bot.

use std::time::Duration;
use thiserror::Error;

/// Main error type for relay operations.
///
/// The rate limiter and session store never fail; these errors come from
/// configuration and the two network edges (transport and generation backend).
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation backend answered with an error or an unusable body
    #[error("Backend error{}: {message}", status_suffix(.status))]
    Backend {
        /// HTTP status, when the backend answered at all
        status: Option<u16>,
        /// Human-readable detail
        message: String,
    },

    /// The generation backend did not answer in time
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),

    /// Chat transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
