//! Error types for the connector core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed option value or unreadable config file.
    #[error("Configuration error: {0}")]
    Config(String),
}
