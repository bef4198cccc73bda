//! Signing keys, webhook signatures, and token digests.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Generate a 32-byte signing key for a webhook target.
pub fn generate_signing_key() -> Vec<u8> {
    let mut key = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Generate an opaque token: 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    hex::encode(generate_signing_key())
}

/// Hex SHA-256 digest. Used for personal access tokens and intent tokens,
/// where the log must never contain the plaintext.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// HMAC-SHA256 signature over a webhook payload, hex encoded.
pub fn sign_payload(key: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a payload signature.
pub fn verify_payload(key: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_keys_are_32_bytes_and_unique() {
        let a = generate_signing_key();
        let b = generate_signing_key();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let key = generate_signing_key();
        let signature = sign_payload(&key, b"payload");
        assert!(verify_payload(&key, b"payload", &signature));
        assert!(!verify_payload(&key, b"tampered", &signature));
        assert!(!verify_payload(&key, b"payload", "not-hex"));
    }

    #[test]
    fn digests_are_stable() {
        assert_eq!(sha256_hex(b"token"), sha256_hex(b"token"));
        assert_ne!(sha256_hex(b"token"), sha256_hex(b"other"));
        assert_eq!(sha256_hex(b"token").len(), 64);
    }
}
