//! Bulk key provisioning, decommissioning, and snapshot backup/restore.
//!
//! Administration bypasses the binding rules: keys are removed regardless of
//! binding state, and an import replaces the whole store. A scope exists
//! exactly while at least one key carries it, so deleting the last key of a
//! scope removes the scope.

use std::sync::Arc;

use keygate_store::{CreateOutcome, DeleteOutcome, KeyStore, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Per-key outcome of a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOutcome<O> {
    pub key_id: String,
    pub outcome: O,
}

/// Administration entry points over the key store.
pub struct AdminFacade {
    store: Arc<dyn KeyStore>,
}

impl AdminFacade {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Provisions a batch of keys, reporting each key's outcome.
    pub fn add_keys(
        &self,
        scope: Option<&str>,
        key_ids: &[String],
    ) -> EngineResult<Vec<KeyOutcome<CreateOutcome>>> {
        let scope = normalize_scope(scope)?;
        let mut report = Vec::with_capacity(key_ids.len());
        for key_id in key_ids {
            let key_id = key_id.trim();
            if key_id.is_empty() {
                return Err(EngineError::MissingParameter("key"));
            }
            let outcome = self.store.create(scope, key_id)?;
            report.push(KeyOutcome {
                key_id: key_id.to_string(),
                outcome,
            });
        }
        info!(scope, count = report.len(), "provisioned keys");
        Ok(report)
    }

    /// Removes a batch of keys, reporting each key's outcome.
    pub fn delete_keys(
        &self,
        scope: Option<&str>,
        key_ids: &[String],
    ) -> EngineResult<Vec<KeyOutcome<DeleteOutcome>>> {
        let scope = normalize_scope(scope)?;
        let mut report = Vec::with_capacity(key_ids.len());
        for key_id in key_ids {
            let key_id = key_id.trim();
            if key_id.is_empty() {
                return Err(EngineError::MissingParameter("key"));
            }
            let outcome = self.store.delete(scope, key_id)?;
            report.push(KeyOutcome {
                key_id: key_id.to_string(),
                outcome,
            });
        }
        info!(scope, count = report.len(), "decommissioned keys");
        Ok(report)
    }

    /// Full dump of both pools.
    pub fn export(&self) -> EngineResult<Snapshot> {
        Ok(self.store.export()?)
    }

    /// Validates and applies a whole-store replacement.
    ///
    /// A snapshot that fails validation is rejected before anything is
    /// written; a valid one is applied in a single transaction.
    pub fn import(&self, snapshot: &Snapshot) -> EngineResult<()> {
        snapshot.validate()?;
        self.store.import(snapshot)?;
        info!(keys = snapshot.len(), "snapshot imported");
        Ok(())
    }
}

fn normalize_scope(scope: Option<&str>) -> EngineResult<Option<&str>> {
    match scope {
        Some(s) => {
            let s = s.trim();
            if s.is_empty() {
                Err(EngineError::MissingParameter("scope"))
            } else {
                Ok(Some(s))
            }
        }
        None => Ok(None),
    }
}
