//! Common error types for Wavefield

use thiserror::Error;

/// Common result type for Wavefield operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across Wavefield crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Block size / tick size / sample rate combination is unusable
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
