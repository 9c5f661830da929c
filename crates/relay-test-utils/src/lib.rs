// relay-test-utils: shared test helpers for exercising the relay server's
// HTTP and handoff-channel surfaces without duplicating signing boilerplate
// in every integration test.

pub mod mock_ws_client;

pub use mock_ws_client::MockWsClient;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

/// A throwaway Ed25519 identity for driving signed requests in tests.
pub struct SigningIdentity {
    signing_key: SigningKey,
}

impl SigningIdentity {
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// The opaque printable public key as sent in the `X-Public-Key` header.
    pub fn public_key(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs an HTTP request the same way the relay's verifier expects:
    /// `method + "\n" + path + "\n" + timestamp + "\n" + sha256HexLower(body)`.
    pub fn sign_request(&self, method: &str, path: &str, timestamp: &str, body: &[u8]) -> String {
        // Empty body hashes to the empty string, not sha256(""), matching
        // the relay's own canonical_payload.
        let body_hash = if body.is_empty() {
            String::new()
        } else {
            hex::encode(Sha256::digest(body))
        };
        let payload = format!("{method}\n{path}\n{timestamp}\n{body_hash}");
        let sig = self.signing_key.sign(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(sig.to_bytes())
    }

    /// Signs a handoff-channel auth frame: `prefix + "\n" + publicKey + "\n" + timestamp`.
    pub fn sign_handoff(&self, prefix: &str, timestamp: &str) -> String {
        let payload = format!("{prefix}\n{}\n{timestamp}", self.public_key());
        let sig = self.signing_key.sign(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(sig.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_identity_produces_distinct_keys() {
        let a = SigningIdentity::generate();
        let b = SigningIdentity::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn sign_request_is_deterministic_for_same_inputs() {
        let id = SigningIdentity::generate();
        let s1 = id.sign_request("POST", "/api/entries", "2026-02-17T10:00:00Z", b"body");
        let s2 = id.sign_request("POST", "/api/entries", "2026-02-17T10:00:00Z", b"body");
        assert_eq!(s1, s2);
    }

    #[test]
    fn sign_request_changes_with_body() {
        let id = SigningIdentity::generate();
        let s1 = id.sign_request("POST", "/api/entries", "2026-02-17T10:00:00Z", b"body-a");
        let s2 = id.sign_request("POST", "/api/entries", "2026-02-17T10:00:00Z", b"body-b");
        assert_ne!(s1, s2);
    }
}
