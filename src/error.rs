//! Error types for PixLedger

use thiserror::Error;

/// Failures of the persistence adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backing store could not be read or written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A persisted record exists but does not decode into a ledger.
    #[error("corrupt ledger data: {0}")]
    CorruptData(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("mining aborted before a valid nonce was found")]
    MiningAborted,
    #[error("difficulty {0} cannot be satisfied by a 64 hex digit hash")]
    InvalidDifficulty(u32),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("mining worker failed: {0}")]
    Worker(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio::task::JoinError> for LedgerError {
    fn from(err: tokio::task::JoinError) -> Self {
        LedgerError::Worker(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
