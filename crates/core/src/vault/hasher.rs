//! Content hashing for change detection and optimistic locking.

use std::io::Result;
use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 of a content string, hex-encoded.
///
/// The same digest backs three consumers: the index's `content_hash` column,
/// the optimistic-lock comparison, and the write queue's expected-hash set.
pub fn content_hash_str(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// SHA-256 of a file's bytes, hex-encoded.
pub fn content_hash(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn stable_for_same_content() {
        let a = content_hash_str("# Hello\n\nBody");
        let b = content_hash_str("# Hello\n\nBody");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn differs_on_change() {
        assert_ne!(content_hash_str("a"), content_hash_str("b"));
    }

    #[test]
    fn file_hash_matches_str_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        fs::write(&path, "content here").unwrap();
        assert_eq!(content_hash(&path).unwrap(), content_hash_str("content here"));
    }
}
