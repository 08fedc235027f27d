//! Derived wallet keys.
//!
//! Primary rows are keyed by public key. `keyrecord_by_script` maps a
//! spend script back to its public key so observed outputs can be
//! matched to wallet keys without a full scan.

use agora_crypto::signing::PublicKey;
use agora_types::{KeyPurpose, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{StorageEngine, KEYRECORD, KEYRECORD_BY_SCRIPT};
use crate::table::Table;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub public_key: PublicKey,
    pub script_pubkey: String,
    pub purpose: KeyPurpose,
    /// Set once the key has been attached to a transaction output.
    pub used: bool,
    /// Derivation index within `purpose`.
    pub index: u32,
}

pub struct KeyStore<'a> {
    records: Table<'a, KeyRecord>,
    by_script: Table<'a, PublicKey>,
}

impl<'a> KeyStore<'a> {
    pub(crate) fn new(engine: &'a StorageEngine) -> Result<Self> {
        Ok(Self {
            records: Table::new(KEYRECORD, engine.tree(KEYRECORD)?, engine.codec()),
            by_script: Table::new(KEYRECORD_BY_SCRIPT, engine.tree(KEYRECORD_BY_SCRIPT)?, engine.codec()),
        })
    }

    /// Inserts or replaces a key and its script index entry.
    pub fn put(&self, record: &KeyRecord) -> Result<()> {
        self.records.insert(record.public_key.as_bytes(), record)?;
        self.by_script
            .insert(record.script_pubkey.as_bytes(), &record.public_key)
    }

    pub fn get(&self, public_key: &PublicKey) -> Result<Option<KeyRecord>> {
        self.records.get(public_key.as_bytes())
    }

    pub fn get_by_script(&self, script: &str) -> Result<Option<KeyRecord>> {
        match self.by_script.get(script.as_bytes())? {
            Some(pk) => self.get(&pk),
            None => Ok(None),
        }
    }

    pub fn is_wallet_script(&self, script: &str) -> Result<bool> {
        self.by_script.contains(script.as_bytes())
    }

    /// Marks the key owning `script` as used. Returns `false` when the
    /// script belongs to no wallet key.
    pub fn mark_used(&self, script: &str) -> Result<bool> {
        let Some(mut record) = self.get_by_script(script)? else {
            return Ok(false);
        };
        if !record.used {
            record.used = true;
            self.put(&record)?;
        }
        Ok(true)
    }

    pub fn list(&self) -> Result<Vec<KeyRecord>> {
        self.records.values()
    }

    /// Lowest-index unused key of `purpose`.
    pub fn first_unused(&self, purpose: KeyPurpose) -> Result<Option<KeyRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|k| k.purpose == purpose && !k.used)
            .min_by_key(|k| k.index))
    }

    /// Index the next derived key of `purpose` should use.
    pub fn next_index(&self, purpose: KeyPurpose) -> Result<u32> {
        Ok(self
            .list()?
            .iter()
            .filter(|k| k.purpose == purpose)
            .map(|k| k.index.saturating_add(1))
            .max()
            .unwrap_or(0))
    }
}
