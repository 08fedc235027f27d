//! Value codec shared by every table.
//!
//! An encrypted store seals each value with Encrypt-then-MAC:
//!
//! ```text
//! [nonce 24B] [ciphertext + poly1305 tag] [hmac 32B]
//! ```
//!
//! The HMAC covers `nonce || ciphertext` and is checked before any
//! decryption. The table name is bound as AEAD associated data, so a
//! sealed value copied into another table fails to open. A plaintext
//! store keeps the bincode bytes as they are.

use agora_crypto::aead::{self, NONCE_LEN, TAG_LEN as AEAD_TAG_LEN};
use agora_crypto::hkdf::StoreKeys;
use agora_crypto::mac::{self, TAG_LEN as MAC_TAG_LEN};
use agora_types::{AgoraError, Result};

const MIN_SEALED_LEN: usize = NONCE_LEN + AEAD_TAG_LEN + MAC_TAG_LEN;

/// How values are protected at rest.
pub enum RecordCodec {
    Plaintext,
    Sealed(StoreKeys),
}

impl RecordCodec {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }

    /// Protects `plain` for storage in `table`.
    pub fn seal(&self, table: &str, plain: &[u8]) -> Result<Vec<u8>> {
        let keys = match self {
            Self::Plaintext => return Ok(plain.to_vec()),
            Self::Sealed(keys) => keys,
        };

        let nonce = aead::random_nonce();
        let body = aead::encrypt(keys.enc_key(), &nonce, plain, table.as_bytes())?;
        let tag = mac::hmac_sha256(keys.mac_key(), &[&nonce[..], &body[..]])?;

        let mut out = Vec::with_capacity(NONCE_LEN + body.len() + MAC_TAG_LEN);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&body);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    /// Reverses [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// [`AgoraError::Encryption`] for truncated, tampered or foreign values.
    pub fn open(&self, table: &str, raw: &[u8]) -> Result<Vec<u8>> {
        let keys = match self {
            Self::Plaintext => return Ok(raw.to_vec()),
            Self::Sealed(keys) => keys,
        };

        if raw.len() < MIN_SEALED_LEN {
            return Err(AgoraError::Encryption {
                reason: format!(
                    "sealed value in '{table}' too short: {} < {MIN_SEALED_LEN} bytes",
                    raw.len()
                ),
            });
        }

        let (nonce_bytes, rest) = raw.split_at(NONCE_LEN);
        let (body, tag) = rest.split_at(rest.len() - MAC_TAG_LEN);
        mac::verify_hmac_sha256(keys.mac_key(), &[nonce_bytes, body], tag)?;

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        aead::decrypt(keys.enc_key(), &nonce, body, table.as_bytes())
    }
}

/// bincode-encodes a record.
pub(crate) fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| AgoraError::Persistence {
        reason: format!("record serialization failed: {e}"),
    })
}

/// bincode-decodes a record.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| AgoraError::Persistence {
        reason: format!("record deserialization failed: {e}"),
    })
}
