//! Content hashing shared by workspace snapshots and run artifacts.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Incremental SHA-256 over a sequence of `(name, content)` parts.
///
/// Each part is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
#[derive(Default)]
pub struct TreeHasher {
    inner: Sha256,
}

impl TreeHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, name: &str, content: &[u8]) {
        self.inner.update((name.len() as u64).to_le_bytes());
        self.inner.update(name.as_bytes());
        self.inner.update((content.len() as u64).to_le_bytes());
        self.inner.update(content);
    }

    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}
