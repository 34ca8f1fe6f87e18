//! Error types for the ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// A field does not satisfy its semantic type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A field violates a bound (length, count, future timestamp)
    #[error("Range violation: {0}")]
    RangeViolation(String),

    /// Operation requires state that has not been established yet
    #[error("Unset precondition: {0}")]
    UnsetPrecondition(String),

    /// Equal participant already present (directory entry, collapse role)
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Directory has no such participant
    #[error("Not found: {0}")]
    NotFound(String),

    /// Chain audit found a broken link or a stale hash
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// RSA backend failure that is not a plain verification mismatch
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        Error::Crypto(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::TypeMismatch(format!("invalid base64: {}", err))
    }
}
