//! Content hashing using SHA256

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the exact snippet bytes.
///
/// No normalization is applied: a single whitespace difference yields a
/// different digest.
pub fn content_hash(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}
