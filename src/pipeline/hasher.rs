//! Stable value digests for the hash stage and the hashing special functions.

use sha2::{Digest as _, Sha256};

/// Hash algorithm identifier recorded alongside hashed outputs.
pub const HASH_ALGORITHM: &str = "SHA-256";

/// Maps a cell value to a stable digest. Implementations must be
/// deterministic: equal inputs always give equal outputs, across runs.
pub trait ValueHasher: Send + Sync {
    fn digest(&self, value: &str) -> String;
}

/// SHA-256 of the UTF-8 bytes, as lowercase hex (64 characters).
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl ValueHasher for Sha256Hasher {
    fn digest(&self, value: &str) -> String {
        let hash = Sha256::digest(value.as_bytes());
        format!("{hash:x}")
    }
}
