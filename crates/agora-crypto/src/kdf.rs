//! Argon2id passphrase stretching.
//!
//! The record store derives its master key from the user's passphrase
//! and a per-store random salt kept in the store's meta tree.

use agora_types::{AgoraError, Result};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Argon2id cost parameters.
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 65 536  | Memory in KiB (64 MiB) |
/// | `t_cost`  | 3       | Passes |
/// | `p_cost`  | 1       | Lanes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Argon2Params {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            m_cost: 65_536,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl Argon2Params {
    /// Cheap parameters for tests and throwaway stores.
    pub fn light() -> Self {
        Self {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// 256-bit master key produced by Argon2id. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub const LEN: usize = 32;

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Minimum salt length accepted by the `argon2` crate.
pub const MIN_SALT_LEN: usize = 8;

/// Stretches `passphrase` into a [`MasterKey`].
///
/// # Errors
///
/// - [`AgoraError::Config`] for a short salt or invalid cost parameters.
/// - [`AgoraError::Crypto`] if hashing itself fails.
pub fn argon2id_derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &Argon2Params,
) -> Result<MasterKey> {
    if salt.len() < MIN_SALT_LEN {
        return Err(AgoraError::Config {
            reason: format!(
                "store salt must be at least {MIN_SALT_LEN} bytes, got {}",
                salt.len()
            ),
        });
    }

    let costs = argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(MasterKey::LEN))
        .map_err(|e| AgoraError::Config {
            reason: format!("invalid Argon2 parameters: {e}"),
        })?;
    let hasher = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, costs);

    let mut out = [0u8; MasterKey::LEN];
    hasher
        .hash_password_into(passphrase, salt, &mut out)
        .map_err(|e| AgoraError::Crypto {
            reason: format!("Argon2id derivation failed: {e}"),
        })?;
    Ok(MasterKey(out))
}
