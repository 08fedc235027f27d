//! Unspent outputs owned by the wallet.
//!
//! Rows are keyed by `txid (32B) || index (u32 BE)`, so all coins created
//! by one transaction are adjacent.

use agora_types::{OutPoint, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{StorageEngine, COINRECORD};
use crate::table::Table;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinRecord {
    pub outpoint: OutPoint,
    pub value: u64,
    pub script_pubkey: String,
}

pub(crate) fn outpoint_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(outpoint.txid.as_bytes());
    key[32..].copy_from_slice(&outpoint.index.to_be_bytes());
    key
}

pub struct CoinStore<'a> {
    table: Table<'a, CoinRecord>,
}

impl<'a> CoinStore<'a> {
    pub(crate) fn new(engine: &'a StorageEngine) -> Result<Self> {
        Ok(Self {
            table: Table::new(COINRECORD, engine.tree(COINRECORD)?, engine.codec()),
        })
    }

    pub fn put(&self, coin: &CoinRecord) -> Result<()> {
        self.table.insert(&outpoint_key(&coin.outpoint), coin)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<CoinRecord>> {
        self.table.get(&outpoint_key(outpoint))
    }

    pub fn contains(&self, outpoint: &OutPoint) -> Result<bool> {
        self.table.contains(&outpoint_key(outpoint))
    }

    /// Removes a coin; `Ok(false)` if it was not present.
    pub fn remove(&self, outpoint: &OutPoint) -> Result<bool> {
        self.table.remove(&outpoint_key(outpoint))
    }

    pub fn list(&self) -> Result<Vec<CoinRecord>> {
        self.table.values()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
