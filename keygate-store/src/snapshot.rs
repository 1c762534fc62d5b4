//! Whole-store snapshots for backup and restore.
//!
//! A snapshot is the persisted layout of the service: a scope-keyed table of
//! key records plus the unscoped table. Maps are `BTreeMap` so serialization
//! is deterministic and an export/import round trip reproduces identical
//! bytes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::record::KeyRecord;

/// Binding state of a single key inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordState {
    /// Whether a device has claimed the key.
    pub bound: bool,
    /// The owning device, if bound.
    pub device_id: Option<String>,
    /// Time of the most recent successful verification, if any.
    pub last_verified: Option<DateTime<Utc>>,
}

impl RecordState {
    fn to_record(&self, scope: Option<String>, key_id: String) -> KeyRecord {
        KeyRecord {
            scope,
            key_id,
            bound: self.bound,
            device_id: self.device_id.clone(),
            last_verified: self.last_verified,
        }
    }
}

/// A full, re-importable dump of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Scoped pools, keyed by scope name then key id.
    pub scoped: BTreeMap<String, BTreeMap<String, RecordState>>,
    /// The unscoped pool, keyed by key id.
    pub unscoped: BTreeMap<String, RecordState>,
}

impl Snapshot {
    /// Adds a record to the matching pool, replacing any previous entry for
    /// the same key.
    pub fn insert(&mut self, record: KeyRecord) {
        let state = RecordState {
            bound: record.bound,
            device_id: record.device_id,
            last_verified: record.last_verified,
        };
        match record.scope {
            Some(scope) => {
                self.scoped.entry(scope).or_default().insert(record.key_id, state);
            }
            None => {
                self.unscoped.insert(record.key_id, state);
            }
        }
    }

    /// All records in the snapshot, scoped pools first.
    #[must_use]
    pub fn records(&self) -> Vec<KeyRecord> {
        let mut records = Vec::with_capacity(self.len());
        for (scope, keys) in &self.scoped {
            for (key_id, state) in keys {
                records.push(state.to_record(Some(scope.clone()), key_id.clone()));
            }
        }
        for (key_id, state) in &self.unscoped {
            records.push(state.to_record(None, key_id.clone()));
        }
        records
    }

    /// Total number of keys across all pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scoped.values().map(BTreeMap::len).sum::<usize>() + self.unscoped.len()
    }

    /// True when no pool holds any key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks structural shape before an import is allowed to touch the store.
    ///
    /// Rejects blank scope names or key ids, bound keys without an owner, and
    /// unbound keys carrying binding state.
    pub fn validate(&self) -> StoreResult<()> {
        for (scope, keys) in &self.scoped {
            if scope.trim().is_empty() {
                return Err(StoreError::InvalidSnapshot("blank scope name".to_string()));
            }
            validate_pool(keys)?;
        }
        validate_pool(&self.unscoped)
    }
}

fn validate_pool(keys: &BTreeMap<String, RecordState>) -> StoreResult<()> {
    for (key_id, state) in keys {
        if key_id.trim().is_empty() {
            return Err(StoreError::InvalidSnapshot("blank key id".to_string()));
        }
        if state.bound && state.device_id.is_none() {
            return Err(StoreError::InvalidSnapshot(format!(
                "bound key '{key_id}' has no device id"
            )));
        }
        if !state.bound && (state.device_id.is_some() || state.last_verified.is_some()) {
            return Err(StoreError::InvalidSnapshot(format!(
                "unbound key '{key_id}' carries binding state"
            )));
        }
    }
    Ok(())
}
