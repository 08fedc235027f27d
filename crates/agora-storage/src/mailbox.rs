//! Dedup records of processed deliveries, keyed by payload location.

use agora_types::{PayloadLocation, Result, Timestamp};
use serde::{Deserialize, Serialize};

use crate::engine::{StorageEngine, MAILBOXENTRY};
use crate::table::Table;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxEntry {
    pub payload_location: PayloadLocation,
    pub timestamp: Timestamp,
}

pub struct MailboxStore<'a> {
    table: Table<'a, MailboxEntry>,
}

impl<'a> MailboxStore<'a> {
    pub(crate) fn new(engine: &'a StorageEngine) -> Result<Self> {
        Ok(Self {
            table: Table::new(MAILBOXENTRY, engine.tree(MAILBOXENTRY)?, engine.codec()),
        })
    }

    pub fn is_processed(&self, location: &PayloadLocation) -> Result<bool> {
        self.table.contains(location.as_str().as_bytes())
    }

    /// Records a delivery. Returns `false` (and leaves the existing row
    /// untouched) if the location was already recorded.
    pub fn record(&self, entry: &MailboxEntry) -> Result<bool> {
        let key = entry.payload_location.as_str().as_bytes();
        if self.table.contains(key)? {
            return Ok(false);
        }
        self.table.insert(key, entry)?;
        Ok(true)
    }

    pub fn get(&self, location: &PayloadLocation) -> Result<Option<MailboxEntry>> {
        self.table.get(location.as_str().as_bytes())
    }

    pub fn list(&self) -> Result<Vec<MailboxEntry>> {
        self.table.values()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
