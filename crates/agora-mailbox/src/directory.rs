//! Pointer directory: publishing and scanning rendezvous pointers.
//!
//! Authored pointers are persisted in the `pointerrecord` table before
//! they are written to the lookup service. A record stays there, and keeps
//! being republished, until it is marked delivered or cancelled.

use std::sync::Arc;
use std::time::Duration;

use agora_storage::{PointerRecord, Repository};
use agora_types::config::AppConfig;
use agora_types::{AgoraError, NodeId, PayloadLocation, PointerId, PointerPurpose, RendezvousKey, Result, Timestamp};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::pointer::{decode_pointer, encode_pointer};
use crate::rendezvous::rendezvous_key;
use crate::transport::{with_deadline, LookupService};

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub pointer_ttl_secs: u64,
    pub network_timeout: Duration,
}

impl DirectoryConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            pointer_ttl_secs: config.pointer_ttl_secs,
            network_timeout: Duration::from_secs(config.network_timeout_secs),
        }
    }

    /// Age after which an authored pointer is republished.
    pub fn republish_after_ms(&self) -> i64 {
        i64::try_from(self.pointer_ttl_secs.saturating_mul(1000) / 2).unwrap_or(i64::MAX)
    }
}

/// Result of one republish pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepublishReport {
    /// `(old id, new id)` for every pointer the lookup service accepted.
    pub republished: Vec<(PointerId, PointerId)>,
    /// Pointers whose publication failed with a transient error.
    pub transient_failures: usize,
    /// Pointers whose publication failed permanently.
    pub failures: usize,
}

impl RepublishReport {
    pub fn attempted(&self) -> usize {
        self.republished.len() + self.transient_failures + self.failures
    }
}

// ---------------------------------------------------------------------------
// PointerScan
// ---------------------------------------------------------------------------

/// Pointers visible under one rendezvous key.
///
/// Decoding and filtering happen lazily as the scan is iterated.
/// Malformed, mismatched and expired entries are skipped with a warning.
/// [`restart`](Self::restart) re-enumerates from the first payload,
/// including pointers the caller already consumed.
#[derive(Clone, Debug)]
pub struct PointerScan {
    key: RendezvousKey,
    purpose: PointerPurpose,
    payloads: Vec<Vec<u8>>,
    position: usize,
    now: Timestamp,
    ttl_secs: u64,
}

impl PointerScan {
    pub fn rendezvous_key(&self) -> &RendezvousKey {
        &self.key
    }

    /// Number of raw payloads returned by the lookup service.
    pub fn raw_len(&self) -> usize {
        self.payloads.len()
    }

    pub fn restart(&mut self) {
        self.position = 0;
    }

    fn accept(&self, raw: &[u8]) -> Option<PointerRecord> {
        let pointer = match decode_pointer(raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "skipping malformed pointer");
                return None;
            }
        };
        if pointer.rendezvous_key != self.key || pointer.purpose != self.purpose {
            tracing::warn!(
                key = %self.key,
                pointer_id = %pointer.pointer_id,
                "skipping pointer published under a mismatched key"
            );
            return None;
        }
        if pointer.is_expired(&self.now, self.ttl_secs) {
            tracing::warn!(pointer_id = %pointer.pointer_id, "skipping expired pointer");
            return None;
        }
        Some(pointer)
    }
}

impl Iterator for PointerScan {
    type Item = PointerRecord;

    fn next(&mut self) -> Option<PointerRecord> {
        while self.position < self.payloads.len() {
            let index = self.position;
            self.position += 1;
            if let Some(pointer) = self.accept(&self.payloads[index]) {
                return Some(pointer);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// PointerDirectory
// ---------------------------------------------------------------------------

pub struct PointerDirectory {
    repo: Arc<Repository>,
    lookup: Arc<dyn LookupService>,
    self_id: NodeId,
    config: DirectoryConfig,
}

impl PointerDirectory {
    pub fn new(repo: Arc<Repository>, lookup: Arc<dyn LookupService>, self_id: NodeId, config: DirectoryConfig) -> Self {
        Self {
            repo,
            lookup,
            self_id,
            config,
        }
    }

    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Publishes a pointer to `location` for `recipient`.
    ///
    /// # Errors
    ///
    /// - [`AgoraError::Publish`] when the lookup service rejects the write.
    /// - [`AgoraError::Network`] on timeout.
    ///
    /// In both cases the record is already persisted with
    /// `published = false` and the republish scheduler retries it.
    pub async fn publish(
        &self,
        purpose: PointerPurpose,
        recipient: &NodeId,
        location: PayloadLocation,
    ) -> Result<PointerRecord> {
        let record = self.record_pointer(purpose, recipient, location, Timestamp::now())?;
        self.announce(record).await
    }

    /// Persists a new, not yet published pointer record.
    pub fn record_pointer(
        &self,
        purpose: PointerPurpose,
        recipient: &NodeId,
        location: PayloadLocation,
        now: Timestamp,
    ) -> Result<PointerRecord> {
        let pointer_id = fresh_pointer_id();
        let record = PointerRecord {
            pointer_id,
            origin_id: pointer_id,
            rendezvous_key: rendezvous_key(recipient, purpose),
            payload_location: location,
            purpose,
            timestamp: now,
            published: false,
        };
        self.repo.with(|store| store.pointers()?.put(&record))?;
        tracing::debug!(pointer_id = %record.pointer_id, %purpose, "pointer recorded");
        Ok(record)
    }

    /// Writes `record` to the lookup service and flips its `published`
    /// flag on success, unless the row was abandoned or renewed meanwhile.
    pub async fn announce(&self, record: PointerRecord) -> Result<PointerRecord> {
        let payload = encode_pointer(&record)?;
        let key = record.rendezvous_key;
        let put = async {
            self.lookup.put(&key, payload).await.map_err(|e| match e {
                AgoraError::Network { .. } => e,
                other => AgoraError::Publish {
                    reason: other.to_string(),
                },
            })
        };
        with_deadline(self.config.network_timeout, "pointer publish", put).await?;

        let published = PointerRecord {
            published: true,
            ..record
        };
        let still_authored = self.repo.with(|store| {
            let pointers = store.pointers()?;
            match pointers.get(&published.origin_id)? {
                Some(current) if current.pointer_id == published.pointer_id => {
                    pointers.put(&published)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })?;
        if still_authored {
            tracing::info!(pointer_id = %published.pointer_id, purpose = %published.purpose, "pointer published");
        } else {
            tracing::debug!(pointer_id = %published.pointer_id, "pointer abandoned while publishing");
        }
        Ok(published)
    }

    /// Scans this node's own rendezvous key for `purpose`.
    pub async fn lookup(&self, purpose: PointerPurpose) -> Result<PointerScan> {
        self.lookup_at(purpose, Timestamp::now()).await
    }

    /// [`lookup`](Self::lookup) with expiry judged at `now`.
    pub async fn lookup_at(&self, purpose: PointerPurpose, now: Timestamp) -> Result<PointerScan> {
        let key = rendezvous_key(&self.self_id, purpose);
        let payloads = with_deadline(self.config.network_timeout, "pointer lookup", self.lookup.get(&key)).await?;
        tracing::debug!(%key, %purpose, count = payloads.len(), "pointer lookup");
        Ok(PointerScan {
            key,
            purpose,
            payloads,
            position: 0,
            now,
            ttl_secs: self.config.pointer_ttl_secs,
        })
    }

    /// Republishes every authored pointer that is unpublished or older
    /// than half the TTL, each under a new pointer id. The row keeps its
    /// origin id.
    pub async fn republish_due(&self, now: Timestamp) -> Result<RepublishReport> {
        let threshold = self.config.republish_after_ms();
        let due: Vec<PointerRecord> = self.repo.with(|store| {
            Ok(store
                .pointers()?
                .list()?
                .into_iter()
                .filter(|p| !p.published || now.millis_since(&p.timestamp) > threshold)
                .collect())
        })?;

        let mut report = RepublishReport::default();
        for old in due {
            let fresh = PointerRecord {
                pointer_id: fresh_pointer_id(),
                timestamp: now,
                published: false,
                ..old.clone()
            };
            let replaced = self.repo.with(|store| {
                let pointers = store.pointers()?;
                match pointers.get(&old.origin_id)? {
                    Some(current) if current.pointer_id == old.pointer_id => {
                        pointers.put(&fresh)?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })?;
            if !replaced {
                continue;
            }

            let new_id = fresh.pointer_id;
            match self.announce(fresh).await {
                Ok(_) => report.republished.push((old.pointer_id, new_id)),
                Err(e) if e.is_transient() => {
                    tracing::warn!(pointer_id = %new_id, error = %e, "republish failed, will retry");
                    report.transient_failures += 1;
                }
                Err(e) => {
                    tracing::error!(pointer_id = %new_id, error = %e, "republish failed");
                    report.failures += 1;
                }
            }
        }
        if report.attempted() > 0 {
            tracing::info!(
                republished = report.republished.len(),
                transient_failures = report.transient_failures,
                failures = report.failures,
                "republish pass finished"
            );
        }
        Ok(report)
    }

    /// Stops republishing a pointer whose recipient has the payload.
    ///
    /// `pointer_id` may be the id returned at publish time or the id the
    /// pointer is currently announced under.
    pub fn mark_delivered(&self, pointer_id: &PointerId) -> Result<bool> {
        self.abandon(pointer_id, "pointer delivered")
    }

    /// Stops republishing a pointer. Accepts the same ids as
    /// [`mark_delivered`](Self::mark_delivered).
    pub fn cancel(&self, pointer_id: &PointerId) -> Result<bool> {
        self.abandon(pointer_id, "pointer cancelled")
    }

    fn abandon(&self, pointer_id: &PointerId, what: &str) -> Result<bool> {
        let removed = self.repo.with(|store| {
            let pointers = store.pointers()?;
            match pointers.resolve(pointer_id)? {
                Some(record) => pointers.remove(&record.origin_id),
                None => Ok(false),
            }
        })?;
        if removed {
            tracing::info!(%pointer_id, "{what}");
        }
        Ok(removed)
    }

    /// Pointers this node authored that are still being maintained.
    pub fn authored(&self) -> Result<Vec<PointerRecord>> {
        self.repo.with(|store| store.pointers()?.list())
    }
}

fn fresh_pointer_id() -> PointerId {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    PointerId::new(bytes)
}
