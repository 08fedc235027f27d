//! Typed view over one sled tree.
//!
//! [`Table<T>`] bincode-encodes `T` and passes the bytes through the
//! store's [`RecordCodec`] on every write, and the reverse on every read.

use std::marker::PhantomData;

use agora_types::{AgoraError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{decode, encode, RecordCodec};

pub struct Table<'a, T> {
    name: &'static str,
    tree: sled::Tree,
    codec: &'a RecordCodec,
    _marker: PhantomData<T>,
}

impl<'a, T> Table<'a, T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(name: &'static str, tree: sled::Tree, codec: &'a RecordCodec) -> Self {
        Self {
            name,
            tree,
            codec,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<T>> {
        match self.tree.get(key).map_err(|e| self.sled_err("get", e))? {
            None => Ok(None),
            Some(raw) => Ok(Some(self.decode_row(&raw)?)),
        }
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.tree
            .contains_key(key)
            .map_err(|e| self.sled_err("contains", e))
    }

    /// Inserts or replaces the value under `key`.
    pub fn insert(&self, key: &[u8], value: &T) -> Result<()> {
        let sealed = self.codec.seal(self.name, &encode(value)?)?;
        self.tree
            .insert(key, sealed)
            .map_err(|e| self.sled_err("insert", e))?;
        Ok(())
    }

    /// Removes `key`; `Ok(true)` if it was present.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        let prev = self
            .tree
            .remove(key)
            .map_err(|e| self.sled_err("remove", e))?;
        Ok(prev.is_some())
    }

    /// All rows in key order.
    pub fn iter(&self) -> Result<Vec<(Vec<u8>, T)>> {
        let mut rows = Vec::new();
        for item in self.tree.iter() {
            let (key, raw) = item.map_err(|e| self.sled_err("iter", e))?;
            rows.push((key.to_vec(), self.decode_row(&raw)?));
        }
        Ok(rows)
    }

    pub fn values(&self) -> Result<Vec<T>> {
        Ok(self.iter()?.into_iter().map(|(_, v)| v).collect())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn decode_row(&self, raw: &[u8]) -> Result<T> {
        decode(&self.codec.open(self.name, raw)?)
    }

    fn sled_err(&self, op: &str, e: sled::Error) -> AgoraError {
        AgoraError::Persistence {
            reason: format!("{} {op} failed: {e}", self.name),
        }
    }
}
