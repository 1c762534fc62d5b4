//! The key-binding state machine.

use std::sync::Arc;

use chrono::Utc;
use keygate_store::{BindOutcome, KeyRecord, KeyStore};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::signature::CredentialVerifier;

/// How a request is authenticated and which pool it targets.
///
/// Secure mode requires both a scope and a credential; any other combination
/// is simple mode against the unscoped pool. This is a property of the
/// request, not of the key.
#[derive(Debug, Clone, Copy)]
enum Mode<'a> {
    Secure { scope: &'a str, credential: &'a str },
    Simple,
}

impl<'a> Mode<'a> {
    fn select(scope: Option<&'a str>, credential: Option<&'a str>) -> Self {
        match (scope, credential) {
            (Some(scope), Some(credential)) => Self::Secure { scope, credential },
            _ => Self::Simple,
        }
    }
}

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// The record after the bind.
    pub record: KeyRecord,
    /// True when this call performed the first claim rather than a re-verify.
    /// Observability detail only; callers see the same success either way.
    pub newly_bound: bool,
}

/// Applies the bind transition for verify-key and register-device requests.
///
/// Both entry points are the same state transition; they differ only in how
/// the HTTP layer sources the device id.
pub struct BindingEngine {
    store: Arc<dyn KeyStore>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl BindingEngine {
    pub fn new(store: Arc<dyn KeyStore>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { store, verifier }
    }

    /// Attempts to claim (or re-verify) a key for a device.
    ///
    /// Transition rule:
    /// 1. Secure mode with a failing credential → `SignatureInvalid`
    /// 2. Unknown `(scope, key_id)` → `ScopeOrKeyNotFound`
    /// 3. Key owned by another device → `DeviceConflict`
    /// 4. Otherwise the key is bound to the device and `last_verified` moves
    ///
    /// Repeat calls by the owning device always succeed.
    pub fn bind(
        &self,
        scope: Option<&str>,
        key_id: &str,
        device_id: &str,
        credential: Option<&str>,
    ) -> EngineResult<Verification> {
        let key_id = key_id.trim();
        let device_id = device_id.trim();
        if key_id.is_empty() {
            return Err(EngineError::MissingParameter("key"));
        }
        if device_id.is_empty() {
            return Err(EngineError::MissingParameter("device_id"));
        }

        // Blank scope or credential counts as absent.
        let scope = scope.map(str::trim).filter(|s| !s.is_empty());
        let credential = credential.map(str::trim).filter(|c| !c.is_empty());

        let lookup_scope = match Mode::select(scope, credential) {
            Mode::Secure { scope, credential } => {
                if !self.verifier.verify(scope, credential) {
                    warn!(scope, key = key_id, "credential rejected");
                    return Err(EngineError::SignatureInvalid);
                }
                Some(scope)
            }
            Mode::Simple => None,
        };

        match self
            .store
            .compare_and_bind(lookup_scope, key_id, device_id, Utc::now())?
        {
            BindOutcome::Bound(record) => {
                info!(scope = lookup_scope, key = key_id, device = device_id, "key bound");
                Ok(Verification {
                    record,
                    newly_bound: true,
                })
            }
            BindOutcome::Reverified(record) => {
                info!(scope = lookup_scope, key = key_id, device = device_id, "key re-verified");
                Ok(Verification {
                    record,
                    newly_bound: false,
                })
            }
            BindOutcome::Conflict(_) => {
                warn!(
                    scope = lookup_scope,
                    key = key_id,
                    device = device_id,
                    "bind rejected: key owned by another device"
                );
                Err(EngineError::DeviceConflict)
            }
            BindOutcome::Missing => Err(EngineError::ScopeOrKeyNotFound),
        }
    }

    /// All currently bound keys.
    pub fn list_used(&self) -> EngineResult<Vec<KeyRecord>> {
        Ok(self.store.list_used()?)
    }
}
