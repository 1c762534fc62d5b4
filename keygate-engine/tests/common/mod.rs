//! Shared test helpers for engine tests.

#![allow(dead_code)]

use std::sync::Arc;

use keygate_engine::{AdminFacade, BindingEngine, HmacCredentialVerifier};
use keygate_store::{KeyStore, SqliteKeyStore};

pub const TEST_SECRET: &[u8] = b"keygate-test-secret";

pub struct Harness {
    pub engine: Arc<BindingEngine>,
    pub admin: AdminFacade,
    pub store: Arc<dyn KeyStore>,
}

/// Engine, admin facade, and a shared in-memory store.
pub fn harness() -> Harness {
    let store: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::open_in_memory().unwrap());
    let verifier = Arc::new(HmacCredentialVerifier::new(TEST_SECRET));
    Harness {
        engine: Arc::new(BindingEngine::new(Arc::clone(&store), verifier)),
        admin: AdminFacade::new(Arc::clone(&store)),
        store,
    }
}

/// The valid credential for a scope under the test secret.
pub fn credential(scope: &str) -> String {
    HmacCredentialVerifier::new(TEST_SECRET).credential_for(scope)
}
