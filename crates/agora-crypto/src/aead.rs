//! XChaCha20-Poly1305 sealing for stored records.
//!
//! Nonces are 24 random bytes from OS entropy; the 192-bit space makes
//! per-record random nonces safe.

use agora_types::{AgoraError, Result};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;

/// Byte length of an XChaCha20 nonce.
pub const NONCE_LEN: usize = 24;

/// Byte length of the Poly1305 tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Fresh random nonce.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts `plaintext`, binding `aad` (the record's table and key).
pub fn encrypt(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    XChaCha20Poly1305::new(Key::from_slice(key))
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|e| AgoraError::Crypto {
            reason: format!("record encryption failed: {e}"),
        })
}

/// Decrypts a ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// [`AgoraError::Encryption`] on wrong key, nonce, AAD or a tampered body.
pub fn decrypt(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    XChaCha20Poly1305::new(Key::from_slice(key))
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| AgoraError::Encryption {
            reason: "record decryption failed".into(),
        })
}
