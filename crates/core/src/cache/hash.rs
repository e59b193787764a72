//! Stable digests for filesystem-safe key components.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a client identity.
///
/// User agents contain `/`, spaces and other characters that do not belong
/// in a path segment, so the filesystem backend stores them by digest.
pub fn identity_digest(identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}
