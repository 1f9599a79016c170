//! One-way user identifier anonymization
//!
//! Civic profiles carry a `user_hash` alongside the stable user id so the
//! profile can be exported or shared without directly exposing identity.
//! The hash is a salted SHA-256 digest; without the salt it cannot be
//! reversed to the stable id.

use sha2::{Digest, Sha256};

/// Derive the anonymized hash for a stable user id.
///
/// Deterministic for a given (salt, user_id) pair so repeated profile
/// updates produce the same hash.
pub fn user_hash(salt: &str, user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.as_bytes());
    format!("{:x}", hasher.finalize())
}
