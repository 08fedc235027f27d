//! SLIP-0010 Ed25519 derivation of wallet keys.
//!
//! Each wallet key lives at a fully hardened path:
//!
//! ```text
//! m/44'/0'/0'/{purpose}'/{index}'
//! ```
//!
//! where `purpose` is the persisted [`KeyPurpose`] code. Only hardened
//! steps exist for Ed25519, so every component carries the offset.
//!
//! Reference: <https://github.com/satoshilabs/slips/blob/master/slip-0010.md>

use agora_types::{AgoraError, KeyPurpose, Result};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroize;

use crate::mnemonic::Seed;
use crate::signing::Keypair;

type HmacSha512 = Hmac<Sha512>;

const HARDENED: u32 = 0x8000_0000;
const CURVE_KEY: &[u8] = b"ed25519 seed";

/// Wallet account prefix: `44'/0'/0'`.
const ACCOUNT_PREFIX: [u32; 3] = [44, 0, 0];

/// Path of the wallet key for `(purpose, index)`, in display form.
pub fn wallet_key_path(purpose: KeyPurpose, index: u32) -> String {
    format!("m/44'/0'/0'/{}'/{}'", purpose.as_u8(), index)
}

/// Derives the wallet keypair for `(purpose, index)`.
///
/// # Errors
///
/// [`AgoraError::Validation`] if `index` does not fit below the hardened
/// offset.
pub fn derive_wallet_key(seed: &Seed, purpose: KeyPurpose, index: u32) -> Result<Keypair> {
    if index >= HARDENED {
        return Err(AgoraError::Validation {
            reason: format!("key index {index} exceeds {}", HARDENED - 1),
        });
    }
    let mut path = ACCOUNT_PREFIX.to_vec();
    path.push(u32::from(purpose.as_u8()));
    path.push(index);
    derive_path(seed.as_bytes(), &path)
}

/// Derives the node identity key at `m/44'/0'/1'`.
pub fn derive_identity_key(seed: &Seed) -> Result<Keypair> {
    derive_path(seed.as_bytes(), &[44, 0, 1])
}

fn derive_path(seed: &[u8], path: &[u32]) -> Result<Keypair> {
    let mut node = hmac_sha512(CURVE_KEY, seed)?;
    for &index in path {
        let mut data = [0u8; 37];
        data[1..33].copy_from_slice(&node[..32]);
        data[33..].copy_from_slice(&(index | HARDENED).to_be_bytes());
        let child = hmac_sha512(&node[32..], &data)?;
        data.zeroize();
        node.zeroize();
        node = child;
    }

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&node[..32]);
    let keypair = Keypair::from_seed(&secret);
    secret.zeroize();
    node.zeroize();
    Ok(keypair)
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<[u8; 64]> {
    let mut mac = HmacSha512::new_from_slice(key).map_err(|e| AgoraError::Crypto {
        reason: format!("HMAC-SHA512 key init failed: {e}"),
    })?;
    mac.update(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}
