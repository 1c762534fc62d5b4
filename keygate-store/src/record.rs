//! Key records and per-operation outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single license key and its binding state.
///
/// Identified by `(scope, key_id)`; `scope = None` is the unscoped pool.
/// Once `bound` is set the owning `device_id` never changes for the rest of
/// the record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Application namespace the key lives in; `None` for the unscoped pool.
    pub scope: Option<String>,
    /// Key identifier, unique within its scope.
    pub key_id: String,
    /// Whether a device has claimed this key.
    pub bound: bool,
    /// The owning device, set on the first successful claim.
    pub device_id: Option<String>,
    /// Time of the most recent successful verification.
    pub last_verified: Option<DateTime<Utc>>,
}

/// Outcome of provisioning a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateOutcome {
    /// The key did not exist and was created unbound.
    Created,
    /// The `(scope, key_id)` pair already exists; nothing was written.
    AlreadyExists,
}

/// Outcome of removing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The key existed and is gone, whatever its binding state was.
    Deleted,
    /// No such key.
    NotFound,
}

/// Outcome of an atomic compare-and-bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The key was unbound; the calling device now owns it.
    Bound(KeyRecord),
    /// The key was already owned by the calling device; only the
    /// verification time moved.
    Reverified(KeyRecord),
    /// The key is owned by a different device. Nothing was written.
    Conflict(KeyRecord),
    /// No such key in the target pool. Nothing was written.
    Missing,
}
