//! Durable key-binding storage for Keygate.
//!
//! This crate holds the persistent side of the activation service:
//! - Scoped and unscoped pools of license keys
//! - Atomic compare-and-bind: read, decide, write as one transaction
//! - Whole-store snapshots for backup and restore
//!
//! # Design Principles
//!
//! - **One writer boundary**: every mutation goes through a single serialized
//!   connection, so concurrent binds to the same key are applied one at a time
//! - **Commit last**: a successful call returns only after the write is
//!   durable; a failed call leaves the store exactly as it was
//! - **No implicit creation**: keys exist only when provisioned explicitly

mod error;
mod record;
mod snapshot;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use record::{BindOutcome, CreateOutcome, DeleteOutcome, KeyRecord};
pub use snapshot::{RecordState, Snapshot};
pub use sqlite::SqliteKeyStore;

use chrono::{DateTime, Utc};

/// Storage seam for the binding engine and administration facade.
///
/// Implementations must serialize `compare_and_bind` calls targeting the same
/// `(scope, key_id)` pair: no caller may observe a record between the read and
/// the write of another caller's bind.
pub trait KeyStore: Send + Sync {
    /// Looks up a single record, or `None` if the pair was never provisioned.
    fn get(&self, scope: Option<&str>, key_id: &str) -> StoreResult<Option<KeyRecord>>;

    /// Provisions an unbound key. Never overwrites an existing record.
    fn create(&self, scope: Option<&str>, key_id: &str) -> StoreResult<CreateOutcome>;

    /// Removes a key regardless of its binding state.
    fn delete(&self, scope: Option<&str>, key_id: &str) -> StoreResult<DeleteOutcome>;

    /// Atomically applies the binding decision for one key.
    ///
    /// Reads the current record, decides, and writes the result in a single
    /// transaction. An unbound key (or one already owned by `device_id`) is
    /// bound with `last_verified = now`; a key owned by another device is left
    /// untouched and reported as a conflict.
    fn compare_and_bind(
        &self,
        scope: Option<&str>,
        key_id: &str,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<BindOutcome>;

    /// All currently bound records.
    fn list_used(&self) -> StoreResult<Vec<KeyRecord>>;

    /// Full, re-importable dump of both pools.
    fn export(&self) -> StoreResult<Snapshot>;

    /// Replaces the entire store with the snapshot contents in one
    /// transaction. Never merges, never partially applies.
    fn import(&self, snapshot: &Snapshot) -> StoreResult<()>;
}
