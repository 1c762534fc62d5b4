//! Scope credential verification.
//!
//! The expected credential for a scope is `hex(HMAC-SHA256(secret, scope))`,
//! with the secret held server-side only. Malformed or undecodable
//! credentials verify to false; they never error. Comparison is constant
//! time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verification seam for secure-mode requests.
pub trait CredentialVerifier: Send + Sync {
    /// Returns true iff `credential` is the expected credential for `scope`.
    fn verify(&self, scope: &str, credential: &str) -> bool;
}

/// Keyed-MAC credential verifier.
pub struct HmacCredentialVerifier {
    secret: Vec<u8>,
}

impl HmacCredentialVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Mints the expected credential for a scope.
    ///
    /// Used when provisioning a scope and in tests; the secret itself never
    /// leaves the server.
    #[must_use]
    pub fn credential_for(&self, scope: &str) -> String {
        hex::encode(self.mac(scope).finalize().into_bytes())
    }

    fn mac(&self, scope: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(scope.as_bytes());
        mac
    }
}

impl CredentialVerifier for HmacCredentialVerifier {
    fn verify(&self, scope: &str, credential: &str) -> bool {
        let Ok(presented) = hex::decode(credential.trim()) else {
            return false;
        };
        // verify_slice compares in constant time and rejects wrong lengths
        self.mac(scope).verify_slice(&presented).is_ok()
    }
}
