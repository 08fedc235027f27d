//! HKDF-SHA256 key separation.
//!
//! A single Argon2id master key is expanded into independent cipher and
//! MAC keys so the two halves of Encrypt-then-MAC never share material.

use agora_types::{AgoraError, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

const ENC_INFO: &[u8] = b"agora-store-enc-v1";
const MAC_INFO: &[u8] = b"agora-store-mac-v1";

/// Cipher and MAC keys for one record store. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct StoreKeys {
    enc: [u8; 32],
    mac: [u8; 32],
}

impl StoreKeys {
    pub fn enc_key(&self) -> &[u8; 32] {
        &self.enc
    }

    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac
    }
}

/// Expands `master` into a [`StoreKeys`] pair, salted with the store salt.
pub fn split_store_keys(master: &[u8; 32], salt: &[u8]) -> Result<StoreKeys> {
    let hk = Hkdf::<Sha256>::new(Some(salt), master);
    let mut keys = StoreKeys {
        enc: [0u8; 32],
        mac: [0u8; 32],
    };
    hk.expand(ENC_INFO, &mut keys.enc)
        .map_err(|e| AgoraError::Crypto {
            reason: format!("HKDF expand (enc) failed: {e}"),
        })?;
    hk.expand(MAC_INFO, &mut keys.mac)
        .map_err(|e| AgoraError::Crypto {
            reason: format!("HKDF expand (mac) failed: {e}"),
        })?;
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enc_and_mac_keys_differ() -> std::result::Result<(), AgoraError> {
        let keys = split_store_keys(&[7u8; 32], b"salt-salt")?;
        assert_ne!(keys.enc_key(), keys.mac_key());
        Ok(())
    }

    #[test]
    fn salt_changes_both_keys() -> std::result::Result<(), AgoraError> {
        let a = split_store_keys(&[7u8; 32], b"salt-aaaa")?;
        let b = split_store_keys(&[7u8; 32], b"salt-bbbb")?;
        assert_ne!(a.enc_key(), b.enc_key());
        assert_ne!(a.mac_key(), b.mac_key());
        Ok(())
    }

    #[test]
    fn split_is_deterministic() -> std::result::Result<(), AgoraError> {
        let a = split_store_keys(&[1u8; 32], b"salt-salt")?;
        let b = split_store_keys(&[1u8; 32], b"salt-salt")?;
        assert_eq!(a.enc_key(), b.enc_key());
        Ok(())
    }
}
