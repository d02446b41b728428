//! Error types for PiKV

use std::io;
use thiserror::Error;

/// Result type alias for PiKV operations
pub type Result<T> = std::result::Result<T, PikvError>;

/// Custom error types for PiKV
#[derive(Error, Debug)]
pub enum PikvError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame too large: payload is {len} bytes, at most {max} fit in a frame")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Unknown command: {0:?}")]
    UnknownVerb(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Could not connect to {addr} after {attempts} attempts: {source}")]
    ConnectTimeout {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Usage error: {0}")]
    Usage(String),
}
