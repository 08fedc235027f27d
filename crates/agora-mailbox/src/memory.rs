//! In-process lookup and content services.
//!
//! Used by tests and by a node run without a network substrate. Both can
//! be switched offline to simulate an unreachable service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use agora_crypto::hash::sha3_256;
use agora_types::{AgoraError, PayloadLocation, RendezvousKey, Result};
use async_trait::async_trait;

use crate::transport::{ContentStore, LookupService};

fn offline() -> AgoraError {
    AgoraError::Network {
        reason: "service unreachable".into(),
    }
}

fn poisoned() -> AgoraError {
    AgoraError::Persistence {
        reason: "in-memory service lock poisoned".into(),
    }
}

#[derive(Default)]
pub struct MemoryLookup {
    entries: Mutex<HashMap<RendezvousKey, Vec<Vec<u8>>>>,
    offline: AtomicBool,
    rejecting: AtomicBool,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While set, `put` answers with a rejection instead of storing.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Total payloads stored under `key`.
    pub fn count(&self, key: &RendezvousKey) -> usize {
        self.entries
            .lock()
            .map(|e| e.get(key).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl LookupService for MemoryLookup {
    async fn put(&self, key: &RendezvousKey, payload: Vec<u8>) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(offline());
        }
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(AgoraError::Publish {
                reason: format!("lookup service refused record under {key}"),
            });
        }
        self.entries
            .lock()
            .map_err(|_| poisoned())?
            .entry(*key)
            .or_default()
            .push(payload);
        Ok(())
    }

    async fn get(&self, key: &RendezvousKey) -> Result<Vec<Vec<u8>>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(self
            .entries
            .lock()
            .map_err(|_| poisoned())?
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

/// Content store addressing payloads by the hex SHA3-256 of their bytes.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<PayloadLocation, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn store(&self, bytes: &[u8]) -> Result<PayloadLocation> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(offline());
        }
        let location = PayloadLocation::new(hex::encode(sha3_256(bytes)))?;
        self.blobs
            .lock()
            .map_err(|_| poisoned())?
            .insert(location.clone(), bytes.to_vec());
        Ok(location)
    }

    async fn fetch(&self, location: &PayloadLocation) -> Result<Vec<u8>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(offline());
        }
        self.blobs
            .lock()
            .map_err(|_| poisoned())?
            .get(location)
            .cloned()
            .ok_or_else(|| AgoraError::Network {
                reason: format!("payload {location} not found"),
            })
    }
}
