//! External services the mailbox talks to.
//!
//! The distributed lookup service and the content-addressed store are
//! consumed only through these traits. Every call made through them is
//! wrapped in [`with_deadline`].

use std::future::Future;
use std::time::Duration;

use agora_types::{AgoraError, PayloadLocation, RendezvousKey, Result};
use async_trait::async_trait;

/// Multi-value key/value lookup (DHT-style): `put` appends, `get` returns
/// every payload currently visible under the key.
#[async_trait]
pub trait LookupService: Send + Sync {
    async fn put(&self, key: &RendezvousKey, payload: Vec<u8>) -> Result<()>;

    async fn get(&self, key: &RendezvousKey) -> Result<Vec<Vec<u8>>>;
}

/// Content-addressed payload store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn store(&self, bytes: &[u8]) -> Result<PayloadLocation>;

    async fn fetch(&self, location: &PayloadLocation) -> Result<Vec<u8>>;
}

/// Runs `fut` under `timeout`. Expiry becomes [`AgoraError::Network`].
pub async fn with_deadline<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| {
            Err(AgoraError::Network {
                reason: format!("{what} timed out after {}ms", timeout.as_millis()),
            })
        })
}
