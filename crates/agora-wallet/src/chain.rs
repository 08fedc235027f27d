//! Chain-facing collaborators: broadcast, observation feed, rates.

use std::future::Future;
use std::time::Duration;

use agora_types::{AgoraError, Result};
use async_trait::async_trait;

/// A transaction seen on the chain feed.
///
/// `height` is `None` while the transaction sits in the mempool, and
/// again after a reorganization drops its block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainEvent {
    pub raw_tx: Vec<u8>,
    pub height: Option<u32>,
}

/// Submits signed transactions to the network.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn submit(&self, raw_tx: &[u8]) -> Result<()>;
}

/// Spot exchange rate for the wallet currency.
pub trait ExchangeRates: Send + Sync {
    fn rate(&self, currency: &str) -> Option<f64>;
}

/// Runs `fut` under a deadline; expiry is a transient network error.
pub async fn with_deadline<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AgoraError::Network {
            reason: format!("{what} timed out after {}s", timeout.as_secs()),
        }),
    }
}
