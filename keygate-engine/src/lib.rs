//! Key-binding core for Keygate.
//!
//! This crate decides whether a device may claim a license key and enforces
//! the one-key-to-one-device binding thereafter:
//! - **Secure mode**: a scope plus a credential, checked against a keyed MAC
//!   before any storage access
//! - **Simple mode**: the unscoped pool, no credential required
//! - **Permanent binding**: the first successful claim fixes the owner; the
//!   same device re-verifies idempotently, every other device is rejected
//! - **Administration**: bulk provisioning and whole-store snapshots, outside
//!   the binding rules

mod admin;
mod engine;
mod error;
mod signature;

pub use admin::{AdminFacade, KeyOutcome};
pub use engine::{BindingEngine, Verification};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use signature::{CredentialVerifier, HmacCredentialVerifier};
