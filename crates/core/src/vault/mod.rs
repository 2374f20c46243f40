//! Vault file discovery and content hashing.

pub mod hasher;
pub mod walker;

pub use hasher::{content_hash, content_hash_str};
pub use walker::{VaultWalker, VaultWalkerError, WalkedFile, system_time_ms};
