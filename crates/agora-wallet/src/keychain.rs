//! Source of wallet key material.
//!
//! The ledger never holds a seed itself; it asks a [`KeySource`] for the
//! public key at `(purpose, index)` when issuing addresses and for the
//! signing key when spending.

use agora_crypto::hd_derive::derive_wallet_key;
use agora_crypto::mnemonic::{Mnemonic, Seed};
use agora_crypto::signing::{Keypair, PublicKey};
use agora_types::{KeyPurpose, Result};

pub trait KeySource: Send + Sync {
    fn signing_key(&self, purpose: KeyPurpose, index: u32) -> Result<Keypair>;

    fn public_key(&self, purpose: KeyPurpose, index: u32) -> Result<PublicKey> {
        Ok(self.signing_key(purpose, index)?.public_key())
    }
}

/// Keys derived by SLIP-0010 from a BIP39 seed.
pub struct MnemonicKeySource {
    seed: Seed,
}

impl MnemonicKeySource {
    pub fn new(mnemonic: &Mnemonic) -> Result<Self> {
        Ok(Self {
            seed: mnemonic.to_seed()?,
        })
    }

    pub fn from_phrase(phrase: &str) -> Result<Self> {
        Self::new(&Mnemonic::parse(phrase)?)
    }
}

impl KeySource for MnemonicKeySource {
    fn signing_key(&self, purpose: KeyPurpose, index: u32) -> Result<Keypair> {
        derive_wallet_key(&self.seed, purpose, index)
    }
}
