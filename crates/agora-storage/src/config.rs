//! Wallet seed and node identity, stored as string values in `config`.

use agora_types::{AgoraError, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::engine::{StorageEngine, CONFIG};
use crate::table::Table;

const KEY_MNEMONIC: &[u8] = b"mnemonic";
const KEY_IDENTITY: &[u8] = b"identityKey";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
}

pub struct ConfigStore<'a> {
    table: Table<'a, ConfigValue>,
}

impl<'a> ConfigStore<'a> {
    pub(crate) fn new(engine: &'a StorageEngine) -> Result<Self> {
        Ok(Self {
            table: Table::new(CONFIG, engine.tree(CONFIG)?, engine.codec()),
        })
    }

    /// Writes the wallet seed phrase and the hex identity key.
    ///
    /// # Errors
    ///
    /// [`AgoraError::Validation`] if the store was already initialized.
    pub fn init(&self, mnemonic: &str, identity_key: &str) -> Result<()> {
        if self.is_initialized()? {
            return Err(AgoraError::Validation {
                reason: "store already holds a wallet seed".into(),
            });
        }
        self.set(KEY_IDENTITY, identity_key)?;
        self.set(KEY_MNEMONIC, mnemonic)
    }

    pub fn is_initialized(&self) -> Result<bool> {
        self.table.contains(KEY_MNEMONIC)
    }

    /// The seed phrase, wiped from memory when the returned value drops.
    ///
    /// # Errors
    ///
    /// [`AgoraError::NotInitialized`] when no seed has been written.
    pub fn get_mnemonic(&self) -> Result<Zeroizing<String>> {
        self.get(KEY_MNEMONIC)?
            .map(Zeroizing::new)
            .ok_or_else(|| AgoraError::NotInitialized {
                reason: "no wallet seed in store".into(),
            })
    }

    pub fn get_identity_key(&self) -> Result<String> {
        self.get(KEY_IDENTITY)?
            .ok_or_else(|| AgoraError::NotInitialized {
                reason: "no identity key in store".into(),
            })
    }

    fn get(&self, key: &[u8]) -> Result<Option<String>> {
        Ok(self.table.get(key)?.map(|v| v.value))
    }

    fn set(&self, key: &[u8], value: &str) -> Result<()> {
        self.table.insert(
            key,
            &ConfigValue {
                value: value.to_string(),
            },
        )
    }
}
