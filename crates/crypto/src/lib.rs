//! Cryptographic support: encryption-key storage (a direct table, not
//! event-sourced), signing-key generation, HMAC webhook signatures, and
//! token digests.

pub mod keys;
pub mod signing;

pub use keys::{EncryptionKey, EncryptionKeyStore, InMemoryKeyStore, PostgresKeyStore};
pub use signing::{
    generate_signing_key, generate_token, sha256_hex, sign_payload, verify_payload,
};
