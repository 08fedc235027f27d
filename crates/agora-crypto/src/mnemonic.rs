//! BIP39 seed phrases for the wallet.
//!
//! Wordlist handling and PBKDF2 seed stretching are delegated to the
//! `bip39` crate. New wallets use 24 words (256 bits of entropy).

use agora_types::{AgoraError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Entropy size for freshly generated phrases.
const ENTROPY_LEN: usize = 32;

/// A validated BIP39 phrase. The text is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Mnemonic(String);

impl Mnemonic {
    /// Generates a new 24-word phrase.
    pub fn generate() -> Result<Self> {
        let mut entropy = [0u8; ENTROPY_LEN];
        OsRng.fill_bytes(&mut entropy);
        let parsed = bip39::Mnemonic::from_entropy(&entropy).map_err(|e| AgoraError::Crypto {
            reason: format!("mnemonic generation failed: {e}"),
        });
        entropy.zeroize();
        Ok(Self(parsed?.to_string()))
    }

    /// Parses and checksums an existing phrase.
    ///
    /// Whitespace is normalized; the word list is English.
    pub fn parse(phrase: &str) -> Result<Self> {
        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let parsed = bip39::Mnemonic::parse_normalized(&normalized).map_err(|e| {
            AgoraError::Validation {
                reason: format!("invalid mnemonic: {e}"),
            }
        })?;
        Ok(Self(parsed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }

    /// Stretches the phrase into a 64-byte [`Seed`] (empty BIP39
    /// passphrase).
    pub fn to_seed(&self) -> Result<Seed> {
        let parsed = bip39::Mnemonic::parse_normalized(&self.0).map_err(|e| AgoraError::Crypto {
            reason: format!("stored mnemonic no longer parses: {e}"),
        })?;
        Ok(Seed(parsed.to_seed("")))
    }
}

/// 64-byte BIP39 seed, the root of wallet key derivation. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 64]);

impl Seed {
    pub const LEN: usize = 64;

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}
