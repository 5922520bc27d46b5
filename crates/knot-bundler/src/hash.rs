//! Content hashing helpers.

use sha2::{Digest, Sha256};

/// Full lowercase hex SHA-256 of `bytes`.
pub fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Truncated content hash as used in filenames and stats.
pub fn short_hash(bytes: &[u8], length: usize) -> String {
    let mut hash = hex_sha256(bytes);
    hash.truncate(length);
    hash
}
