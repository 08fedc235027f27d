//! Chain-observation consumer.
//!
//! Multiplexes with `tokio::select!`:
//!
//! 1. **Chain events** from the mpsc feed, applied to the ledger.
//! 2. **Dead sweep tick** on its own interval.
//! 3. **Shutdown signal** via the `watch` channel.
//!
//! The sweep keeps running after the feed closes; only shutdown stops
//! the task.

use std::sync::Arc;
use std::time::Duration;

use agora_types::{AgoraError, Timestamp};
use agora_wallet::{ChainEvent, WalletLedger};
use tokio::sync::{mpsc, watch};

/// Applies one chain event, logging instead of failing.
pub fn apply_event(ledger: &WalletLedger, event: &ChainEvent) {
    match ledger.observe_transaction(&event.raw_tx, event.height) {
        Ok(Some(record)) => {
            tracing::debug!(txid = %record.txid, state = %record.state, "chain event applied");
        }
        Ok(None) => {}
        Err(AgoraError::Validation { reason }) => {
            tracing::warn!(%reason, "ignoring malformed chain event");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to apply chain event");
        }
    }
}

pub fn sweep(ledger: &WalletLedger) {
    match ledger.sweep_dead(Timestamp::now()) {
        Ok(dead) if !dead.is_empty() => tracing::info!(count = dead.len(), "dead sweep marked transactions dead"),
        Ok(_) => tracing::trace!("dead sweep found nothing"),
        Err(e) => tracing::error!(error = %e, "dead sweep failed"),
    }
}

pub async fn run_chain_consumer(
    ledger: Arc<WalletLedger>,
    mut events: mpsc::Receiver<ChainEvent>,
    sweep_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(sweep_interval_secs = sweep_interval.as_secs(), "chain consumer started");
    let mut sweep_tick = tokio::time::interval(sweep_interval);
    sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut feed_open = true;

    loop {
        tokio::select! {
            event = events.recv(), if feed_open => match event {
                Some(event) => apply_event(&ledger, &event),
                None => {
                    tracing::warn!("chain feed closed");
                    feed_open = false;
                }
            },

            _ = sweep_tick.tick() => sweep(&ledger),

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("chain consumer stopped");
}
