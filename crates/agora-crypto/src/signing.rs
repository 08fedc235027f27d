//! Ed25519 keys for wallet inputs and the node identity.
//!
//! A key's spend script is the lowercase hex of `SHA3-256(public_key)`;
//! outputs pay to that string and inputs prove ownership by signing the
//! unsigned transaction with the matching private key.

use agora_types::{AgoraError, Result};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::hash::sha3_256;

/// Ed25519 public key bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Spend script owned by this key.
    pub fn script(&self) -> String {
        pubkey_to_script(self)
    }
}

/// Ed25519 signature bytes.
///
/// Serialized as a byte string so bincode and CBOR both accept it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature([u8; 64]);

impl Signature {
    pub const LEN: usize = 64;

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SignatureVisitor;

        impl<'de> serde::de::Visitor<'de> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a 64-byte Ed25519 signature")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> std::result::Result<Signature, E> {
                let arr: [u8; 64] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(Signature(arr))
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Signature, A::Error> {
                let mut arr = [0u8; 64];
                for (i, byte) in arr.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                Ok(Signature(arr))
            }
        }

        deserializer.deserialize_bytes(SignatureVisitor)
    }
}

/// Ed25519 signing keypair. The secret half is zeroized on drop by
/// `ed25519-dalek`; the type has no `Clone` or `Debug`.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Random keypair from OS entropy.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte secret.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// The 32-byte secret, for persisting the node identity key.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

/// Checks `signature` over `message` against `public_key`.
///
/// # Errors
///
/// [`AgoraError::Crypto`] for a malformed key or a bad signature.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let vk = VerifyingKey::from_bytes(&public_key.0).map_err(|e| AgoraError::Crypto {
        reason: format!("invalid public key: {e}"),
    })?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify(message, &sig).map_err(|e| AgoraError::Crypto {
        reason: format!("signature verification failed: {e}"),
    })
}

/// Spend script for `public_key`: hex of its SHA3-256 digest.
pub fn pubkey_to_script(public_key: &PublicKey) -> String {
    hex::encode(sha3_256(public_key.as_bytes()))
}

/// Whether `script` has the shape of a spend script (64 lowercase hex
/// characters).
pub fn is_well_formed_script(script: &str) -> bool {
    script.len() == 64 && script.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
