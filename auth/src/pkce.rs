//! Proof Key for Code Exchange (RFC 7636) primitives
//!
//! A public client proves it started the flow it is completing by sending
//! `base64url(sha256(verifier))` with the authorization request and the
//! verifier itself only to the token endpoint.

use base64::Engine;
use openidconnect::PkceCodeChallenge;
use sha2::{Digest, Sha256};

/// Only the S256 method is ever sent
pub const CHALLENGE_METHOD: &str = "S256";

/// Bytes of entropy in a generated verifier (86 characters once encoded)
const VERIFIER_ENTROPY_BYTES: u32 = 64;

/// A PKCE code verifier
///
/// Secret until it reaches the token endpoint; `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Generate a fresh high-entropy verifier.
    pub fn generate() -> Self {
        let (_challenge, verifier) =
            PkceCodeChallenge::new_random_sha256_len(VERIFIER_ENTROPY_BYTES);
        Self(verifier.secret().to_string())
    }

    /// Wrap a verifier read back from storage.
    pub fn from_stored(secret: String) -> Self {
        Self(secret)
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn challenge(&self) -> String {
        challenge(&self.0)
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PkceVerifier(<secret>)")
    }
}

/// S256 code challenge: unpadded base64url of the SHA-256 digest of the verifier
pub fn challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_secret() {
        let verifier = PkceVerifier::from_stored("very-secret-verifier".to_string());
        let printed = format!("{verifier:?}");
        assert!(!printed.contains("very-secret-verifier"));
    }

    #[test]
    fn test_generated_verifier_length() {
        let verifier = PkceVerifier::generate();
        // 64 bytes base64url encoded without padding
        assert_eq!(verifier.secret().len(), 86);
    }
}
