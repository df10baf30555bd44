//! Content hashes in the `sha256:<hex>` form
//!
//! Backups are deduplicated and stale writes detected by comparing these
//! strings, so the hash covers the exact bytes: line endings included.

use sha2::{Digest, Sha256};

const PREFIX: &str = "sha256:";

/// Hash of `content` as stored on disk.
pub fn compute_bytes_checksum(content: &[u8]) -> String {
    format!("{}{:x}", PREFIX, Sha256::digest(content))
}

/// [`compute_bytes_checksum`] of the UTF-8 encoding of `content`.
pub fn compute_content_checksum(content: &str) -> String {
    compute_bytes_checksum(content.as_bytes())
}
