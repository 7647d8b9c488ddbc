//! Utility functions and helpers
//!
//! Hashing, signature primitives, timestamps and binary encoding used
//! throughout the ledger.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, sha256_digest, sha256_hex, verify_hex_signature,
};

pub use serialization::{deserialize, serialize};
