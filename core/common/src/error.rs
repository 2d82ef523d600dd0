//! Common error types for chap.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for chap operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No secret was supplied, or it was empty.
    #[error("Missing secret: no key material was provided")]
    MissingSecret,

    /// The secret could not be brought to the required key length.
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sealed data failed authentication or is not a valid stream.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Cryptographic operation failed while sealing.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Wipe target does not exist.
    #[error("Path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    /// The operator declined a destructive action.
    #[error("Action cancelled")]
    Cancelled,

    /// The dispatcher did not recognize the requested command.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error means sealed input was rejected.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
