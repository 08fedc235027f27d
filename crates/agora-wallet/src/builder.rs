//! Turns a coin selection into a signed transaction.

use agora_crypto::signing::Keypair;
use agora_storage::CoinRecord;
use agora_types::{AgoraError, Result};

use crate::model::{TxInput, TxOutput, WalletTx};
use crate::selection::Selection;

/// Builds and signs the spend described by `selection`.
///
/// Output 0 pays `destination`; output 1, when the selection has change,
/// pays `change_script`. `signer` returns the key owning each selected
/// coin.
pub fn build_spend<F>(
    selection: &Selection,
    destination: &str,
    change_script: Option<&str>,
    mut signer: F,
) -> Result<WalletTx>
where
    F: FnMut(&CoinRecord) -> Result<Keypair>,
{
    let mut keys = Vec::with_capacity(selection.coins.len());
    let mut inputs = Vec::with_capacity(selection.coins.len());
    for coin in &selection.coins {
        let key = signer(coin)?;
        if key.public_key().script() != coin.script_pubkey {
            return Err(AgoraError::Crypto {
                reason: format!("signing key does not own coin {}", coin.outpoint),
            });
        }
        inputs.push(TxInput {
            previous: coin.outpoint,
            public_key: key.public_key(),
            signature: None,
        });
        keys.push(key);
    }

    let mut outputs = vec![TxOutput {
        value: selection.amount,
        script_pubkey: destination.to_string(),
    }];
    if selection.has_change() {
        let script = change_script.ok_or_else(|| AgoraError::Validation {
            reason: "selection has change but no change script was given".into(),
        })?;
        outputs.push(TxOutput {
            value: selection.change,
            script_pubkey: script.to_string(),
        });
    }

    let mut tx = WalletTx::new(inputs, outputs);
    let message = tx.unsigned_bytes()?;
    for (input, key) in tx.inputs.iter_mut().zip(&keys) {
        input.signature = Some(key.sign(&message));
    }
    Ok(tx)
}
