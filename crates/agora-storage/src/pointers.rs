//! Rendezvous pointers authored by this node.

use agora_types::{PayloadLocation, PointerId, PointerPurpose, RendezvousKey, Result, Timestamp};
use serde::{Deserialize, Serialize};

use crate::engine::{StorageEngine, POINTERRECORD};
use crate::table::Table;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRecord {
    /// Id currently announced on the wire; changes on every republish.
    pub pointer_id: PointerId,
    /// Id the pointer was first published under. Rows are keyed by it, so
    /// callers can keep using the id they got back from publishing.
    pub origin_id: PointerId,
    pub rendezvous_key: RendezvousKey,
    pub payload_location: PayloadLocation,
    pub purpose: PointerPurpose,
    /// Time of the latest publication attempt.
    pub timestamp: Timestamp,
    /// Whether the lookup service accepted the latest publication.
    pub published: bool,
}

impl PointerRecord {
    /// `timestamp + ttl`.
    pub fn expires_at(&self, ttl_secs: u64) -> Timestamp {
        self.timestamp.plus_secs(ttl_secs)
    }

    pub fn is_expired(&self, now: &Timestamp, ttl_secs: u64) -> bool {
        *now > self.expires_at(ttl_secs)
    }
}

pub struct PointerStore<'a> {
    table: Table<'a, PointerRecord>,
}

impl<'a> PointerStore<'a> {
    pub(crate) fn new(engine: &'a StorageEngine) -> Result<Self> {
        Ok(Self {
            table: Table::new(POINTERRECORD, engine.tree(POINTERRECORD)?, engine.codec()),
        })
    }

    /// Inserts or overwrites the row for `record.origin_id`.
    pub fn put(&self, record: &PointerRecord) -> Result<()> {
        self.table.insert(record.origin_id.as_bytes(), record)
    }

    pub fn get(&self, origin_id: &PointerId) -> Result<Option<PointerRecord>> {
        self.table.get(origin_id.as_bytes())
    }

    pub fn remove(&self, origin_id: &PointerId) -> Result<bool> {
        self.table.remove(origin_id.as_bytes())
    }

    /// Finds a row by its origin id or by its current wire id.
    pub fn resolve(&self, id: &PointerId) -> Result<Option<PointerRecord>> {
        if let Some(record) = self.get(id)? {
            return Ok(Some(record));
        }
        Ok(self.list()?.into_iter().find(|p| p.pointer_id == *id))
    }

    pub fn list(&self) -> Result<Vec<PointerRecord>> {
        self.table.values()
    }
}
