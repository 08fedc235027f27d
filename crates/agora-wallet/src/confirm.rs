//! Confirmation state machine.
//!
//! ```text
//!   (new) ──no height──▶ Unconfirmed ──height──▶ Confirmed
//!                          ▲    │                   │
//!                          │    │ unseen > horizon  │ observed without
//!                          │    ▼                   │ height (reorg)
//!                          │   Dead                 │
//!                          └────────────────────────┘
//! ```
//!
//! A dead transaction observed again is revived into whichever state its
//! new observation implies.

use agora_storage::TransactionRecord;
use agora_types::{Timestamp, TxState};

/// What an observation did to a transaction's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// First time the wallet sees the transaction.
    New,
    /// Unconfirmed (or confirmed at another height) → confirmed.
    Confirmed(u32),
    /// Confirmed → unconfirmed.
    Reorged { from_height: u32 },
    /// Dead → live again.
    Revived,
    /// Same state and height as before.
    Unchanged,
}

/// Applies one observation to the previous `(state, height)`.
///
/// Returns the new state, its height (present iff confirmed) and the
/// transition taken.
pub fn observe(previous: Option<(TxState, Option<u32>)>, height: Option<u32>) -> (TxState, Option<u32>, Transition) {
    let (state, new_height) = match height {
        Some(h) => (TxState::Confirmed, Some(h)),
        None => (TxState::Unconfirmed, None),
    };

    let transition = match previous {
        None => Transition::New,
        Some((TxState::Dead, _)) => Transition::Revived,
        Some((TxState::Confirmed, Some(old))) if new_height.is_none() => Transition::Reorged { from_height: old },
        Some((prev_state, prev_height)) if prev_state == state && prev_height == new_height => Transition::Unchanged,
        Some(_) => match new_height {
            Some(h) => Transition::Confirmed(h),
            // Unconfirmed → unconfirmed is covered above; a confirmed
            // record with no stored height is repaired to unconfirmed.
            None => Transition::Unchanged,
        },
    };

    (state, new_height, transition)
}

/// Whether an unconfirmed transaction has gone unseen past the horizon.
pub fn is_past_horizon(record: &TransactionRecord, now: &Timestamp, horizon_secs: u64) -> bool {
    let horizon_ms = i64::try_from(horizon_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    record.state == TxState::Unconfirmed && now.millis_since(&record.last_seen) > horizon_ms
}
