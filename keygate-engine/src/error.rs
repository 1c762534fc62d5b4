//! Error vocabulary shared by the binding engine and administration facade.

use keygate_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the binding engine and administration facade.
///
/// Every failure is terminal for the request and leaves state unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required parameter is absent or blank.
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// Secure-mode credential did not verify.
    #[error("credential rejected")]
    SignatureInvalid,

    /// The `(scope, key_id)` pair was never provisioned.
    #[error("unknown scope or key")]
    ScopeOrKeyNotFound,

    /// The key is permanently owned by a different device.
    #[error("key already claimed by another device")]
    DeviceConflict,

    /// Administration: the key already exists.
    #[error("key already exists")]
    AlreadyExists,

    /// Administration: the snapshot failed structural validation.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The store reported a failure; the only kind worth a caller retry.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

/// Wire-level error kinds; the `reason` callers see on a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingParameter,
    SignatureInvalid,
    ScopeOrKeyNotFound,
    DeviceConflict,
    AlreadyExists,
    InvalidSnapshot,
    StorageFailure,
}

impl EngineError {
    /// The wire-level kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameter(_) => ErrorKind::MissingParameter,
            Self::SignatureInvalid => ErrorKind::SignatureInvalid,
            Self::ScopeOrKeyNotFound => ErrorKind::ScopeOrKeyNotFound,
            Self::DeviceConflict => ErrorKind::DeviceConflict,
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::InvalidSnapshot(_) => ErrorKind::InvalidSnapshot,
            Self::StorageFailure(_) => ErrorKind::StorageFailure,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidSnapshot(msg) => Self::InvalidSnapshot(msg),
            StoreError::Storage(msg) => Self::StorageFailure(msg),
        }
    }
}
