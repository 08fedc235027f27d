//! Digest helpers.
//!
//! SHA3-256 names things inside the node (rendezvous keys, spend scripts,
//! table fingerprints). Double SHA-256 names transactions.

use sha2::Sha256;
use sha3::{Digest, Sha3_256};

/// SHA3-256 of a single buffer.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    sha3_256_parts(&[data])
}

/// SHA3-256 over the concatenation of `parts`, without allocating the
/// concatenated buffer.
pub fn sha3_256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// `SHA-256(SHA-256(data))`, used for transaction ids.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(first));
    out
}

/// Incremental SHA3-256 hasher for digests built row by row.
#[derive(Default)]
pub struct Sha3Hasher(Sha3_256);

impl Sha3Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a length-prefixed chunk, so `["ab", "c"]` and `["a", "bc"]`
    /// hash differently.
    pub fn update_framed(&mut self, chunk: &[u8]) {
        self.0.update((chunk.len() as u64).to_be_bytes());
        self.0.update(chunk);
    }

    pub fn finalize(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0.finalize());
        out
    }
}
