//! Wallet-relevant transaction history.

use agora_types::{Result, Timestamp, TxId, TxState};
use serde::{Deserialize, Serialize};

use crate::engine::{StorageEngine, TRANSACTIONRECORD};
use crate::table::Table;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txid: TxId,
    pub raw_tx: Vec<u8>,
    /// Present iff `state == Confirmed`.
    pub height: Option<u32>,
    pub state: TxState,
    /// First time the wallet saw or created the transaction.
    pub timestamp: Timestamp,
    /// Net effect on the wallet balance.
    pub value: i64,
    /// Exchange rate at `timestamp`, when a rate source was available.
    pub exchange_rate: Option<f64>,
    pub exchange_currency: String,
    /// Last time the transaction was observed on the chain feed.
    pub last_seen: Timestamp,
}

impl TransactionRecord {
    /// Whether the stored height agrees with the state.
    pub fn height_matches_state(&self) -> bool {
        (self.state == TxState::Confirmed) == self.height.is_some()
    }

    pub fn is_live(&self) -> bool {
        self.state != TxState::Dead
    }
}

pub struct TransactionStore<'a> {
    table: Table<'a, TransactionRecord>,
}

impl<'a> TransactionStore<'a> {
    pub(crate) fn new(engine: &'a StorageEngine) -> Result<Self> {
        Ok(Self {
            table: Table::new(TRANSACTIONRECORD, engine.tree(TRANSACTIONRECORD)?, engine.codec()),
        })
    }

    pub fn put(&self, record: &TransactionRecord) -> Result<()> {
        self.table.insert(record.txid.as_bytes(), record)
    }

    pub fn get(&self, txid: &TxId) -> Result<Option<TransactionRecord>> {
        self.table.get(txid.as_bytes())
    }

    pub fn contains(&self, txid: &TxId) -> Result<bool> {
        self.table.contains(txid.as_bytes())
    }

    /// All transactions, newest first.
    pub fn list(&self) -> Result<Vec<TransactionRecord>> {
        let mut all = self.table.values()?;
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(all)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
