//! Error types for the lookup subsystem

use thiserror::Error;

/// Lookup error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("Hostname error: {0}")]
    Hostname(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for lookup operations
pub type Result<T> = std::result::Result<T, Error>;
