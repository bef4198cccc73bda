//! PKCE, state, and nonce generation for authorization-code flows.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Proof key for code exchange (S256 only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Kept server-side until the code exchange.
    pub verifier: String,
    /// Sent with the authorization request.
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh verifier (43 url-safe chars from 32 random bytes)
    /// and its S256 challenge.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        Self::from_verifier(verifier)
    }

    fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

/// Opaque CSRF state: 32 random bytes, url-safe base64 (43 chars).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// OIDC nonce, same construction as the state.
pub fn generate_nonce() -> String {
    generate_state()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_and_challenge_are_related() {
        let pair = PkcePair::generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pair.verifier.as_bytes()));
        assert_eq!(pair.challenge, expected);
        assert_eq!(pair.verifier.len(), 43);
    }

    #[test]
    fn state_has_at_least_32_bytes_of_entropy() {
        let state = generate_state();
        assert!(URL_SAFE_NO_PAD.decode(&state).unwrap().len() >= 32);
        assert_ne!(generate_state(), generate_state());
    }
}
