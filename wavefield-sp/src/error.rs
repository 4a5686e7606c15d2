//! Error types for wavefield-sp
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Per-voice faults during a running session are not errors in
//! this sense: the scheduler logs them and degrades gracefully rather than
//! propagating (a glitching voice beats a dead session).

use thiserror::Error;

/// Main error type for the wavefield-sp module
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Playback device or backend errors
    #[error("Playback device error: {0}")]
    Device(String),

    /// Per-voice queue/buffer operation errors
    #[error("Voice error: {0}")]
    Voice(String),

    /// Synthesis source errors
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Invalid block/tick/rate combination
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<wavefield_common::Error> for Error {
    fn from(e: wavefield_common::Error) -> Self {
        match e {
            wavefield_common::Error::Io(e) => Error::Io(e),
            wavefield_common::Error::Config(msg) => Error::Config(msg),
            wavefield_common::Error::InvalidTiming(msg) => Error::InvalidTiming(msg),
            wavefield_common::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Convenience Result type using wavefield-sp Error
pub type Result<T> = std::result::Result<T, Error>;
