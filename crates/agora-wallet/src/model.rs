//! Wire model of a wallet transaction.
//!
//! The raw form is the bincode encoding of [`WalletTx`]. The txid is the
//! double SHA-256 of the *unsigned* encoding (every signature cleared),
//! so signing does not change a transaction's identity.

use agora_crypto::hash::sha256d;
use agora_crypto::signing::{pubkey_to_script, verify, PublicKey, Signature};
use agora_types::{AgoraError, OutPoint, Result, TxId};
use serde::{Deserialize, Serialize};

/// Current transaction format version.
pub const TX_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous: OutPoint,
    /// Key owning the spent output; its script must match the output's.
    pub public_key: PublicKey,
    pub signature: Option<Signature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub script_pubkey: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTx {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl WalletTx {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
        }
    }

    /// Parses a raw transaction.
    ///
    /// # Errors
    ///
    /// [`AgoraError::Validation`] for bytes that do not decode or carry an
    /// unknown version.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let tx: Self = bincode::deserialize(raw).map_err(|e| AgoraError::Validation {
            reason: format!("malformed transaction: {e}"),
        })?;
        if tx.version != TX_VERSION {
            return Err(AgoraError::Validation {
                reason: format!("unsupported transaction version {}", tx.version),
            });
        }
        Ok(tx)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| AgoraError::Validation {
            reason: format!("transaction encoding failed: {e}"),
        })
    }

    /// Encoding with every signature cleared; what each input signs.
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        for input in &mut unsigned.inputs {
            input.signature = None;
        }
        unsigned.encode()
    }

    pub fn txid(&self) -> Result<TxId> {
        Ok(TxId::new(sha256d(&self.unsigned_bytes()?)))
    }

    pub fn outpoint(&self, index: u32) -> Result<OutPoint> {
        Ok(OutPoint::new(self.txid()?, index))
    }

    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Checks that every input is signed by the key it names.
    pub fn verify_signatures(&self) -> Result<()> {
        let message = self.unsigned_bytes()?;
        for (i, input) in self.inputs.iter().enumerate() {
            let signature = input.signature.as_ref().ok_or_else(|| AgoraError::Crypto {
                reason: format!("input {i} is unsigned"),
            })?;
            verify(&input.public_key, &message, signature)?;
        }
        Ok(())
    }

    /// Whether input `i` is owned by `script` (its public key hashes to it).
    pub fn input_owned_by(&self, i: usize, script: &str) -> bool {
        self.inputs
            .get(i)
            .map(|input| pubkey_to_script(&input.public_key) == script)
            .unwrap_or(false)
    }
}
