//! Common error types for LinguaFlow

use thiserror::Error;

/// Common result type for LinguaFlow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across LinguaFlow services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or parsing error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration value present but out of range
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
