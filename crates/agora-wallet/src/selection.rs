//! Greedy largest-first coin selection.
//!
//! Coins are taken in descending value order. After each addition the fee
//! is recomputed for the current input count, first assuming a change
//! output and then without one. A residual above the dust threshold
//! becomes change; a residual at or below it is left to the fee.

use agora_storage::CoinRecord;
use agora_types::{AgoraError, Result};

use crate::fees::fee_for;

/// Outcome of a successful selection.
///
/// `total() == amount + fee + change` always holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub coins: Vec<CoinRecord>,
    pub amount: u64,
    pub fee: u64,
    /// Zero when no change output is created.
    pub change: u64,
}

impl Selection {
    pub fn total(&self) -> u64 {
        self.coins.iter().map(|c| c.value).sum()
    }

    pub fn has_change(&self) -> bool {
        self.change > 0
    }

    /// Number of outputs the transaction will carry.
    pub fn output_count(&self) -> usize {
        if self.has_change() {
            2
        } else {
            1
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.amount
            .checked_add(self.fee)
            .and_then(|v| v.checked_add(self.change))
            == Some(self.total())
    }
}

/// Picks coins from `candidates` covering `amount` plus fee at `rate`.
///
/// # Errors
///
/// [`AgoraError::InsufficientFunds`] when even every candidate together
/// cannot cover `amount` and the fee for spending them all.
pub fn select_coins(candidates: &[CoinRecord], amount: u64, rate: u64, dust: u64) -> Result<Selection> {
    let mut ordered: Vec<&CoinRecord> = candidates.iter().collect();
    ordered.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.outpoint.cmp(&b.outpoint)));

    let mut chosen: Vec<CoinRecord> = Vec::new();
    let mut total: u64 = 0;

    for coin in ordered {
        chosen.push(coin.clone());
        total = total.saturating_add(coin.value);
        let n = chosen.len();

        let fee_with_change = fee_for(rate, n, 2);
        if let Some(change) = total.checked_sub(amount.saturating_add(fee_with_change)) {
            if change > dust {
                return Ok(Selection {
                    coins: chosen,
                    amount,
                    fee: fee_with_change,
                    change,
                });
            }
        }

        let fee_without_change = fee_for(rate, n, 1);
        if total >= amount.saturating_add(fee_without_change) {
            return Ok(Selection {
                coins: chosen,
                amount,
                fee: total - amount,
                change: 0,
            });
        }
    }

    let needed = amount.saturating_add(fee_for(rate, chosen.len().max(1), 1));
    Err(AgoraError::InsufficientFunds {
        needed,
        available: total,
    })
}
