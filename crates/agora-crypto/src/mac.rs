//! HMAC-SHA256 tags.
//!
//! The store authenticates `nonce || ciphertext` before attempting
//! decryption (Encrypt-then-MAC).

use agora_types::{AgoraError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Output length of HMAC-SHA256.
pub const TAG_LEN: usize = 32;

fn keyed(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|e| AgoraError::Crypto {
        reason: format!("HMAC-SHA256 key init failed: {e}"),
    })
}

/// Tag over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; TAG_LEN]> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

/// Constant-time check of `expected` against the tag over `parts`.
///
/// # Errors
///
/// [`AgoraError::Encryption`] when the tag does not match.
pub fn verify_hmac_sha256(key: &[u8], parts: &[&[u8]], expected: &[u8]) -> Result<()> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(expected).map_err(|_| AgoraError::Encryption {
        reason: "record authentication failed (wrong passphrase or tampered data)".into(),
    })
}
