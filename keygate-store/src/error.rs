//! Error types for the key store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage failure (open, read, or write).
    #[error("storage error: {0}")]
    Storage(String),

    /// A snapshot failed structural validation.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
