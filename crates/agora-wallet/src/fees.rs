//! Fee rates and transaction size estimation.

use std::collections::HashMap;

use agora_types::{AgoraError, FeeTier, Result};
use async_trait::async_trait;

/// External fee-rate estimation, in currency units per byte.
#[async_trait]
pub trait FeeEstimator: Send + Sync {
    async fn fee_rate(&self, tier: FeeTier) -> Result<u64>;
}

/// Fixed rate table.
#[derive(Clone, Debug)]
pub struct StaticFeeEstimator {
    rates: HashMap<FeeTier, u64>,
}

impl StaticFeeEstimator {
    pub fn new(priority: u64, normal: u64, economic: u64) -> Self {
        let rates = HashMap::from([
            (FeeTier::Priority, priority),
            (FeeTier::Normal, normal),
            (FeeTier::Economic, economic),
        ]);
        Self { rates }
    }
}

impl Default for StaticFeeEstimator {
    fn default() -> Self {
        Self::new(50, 20, 5)
    }
}

#[async_trait]
impl FeeEstimator for StaticFeeEstimator {
    async fn fee_rate(&self, tier: FeeTier) -> Result<u64> {
        self.rates.get(&tier).copied().ok_or_else(|| AgoraError::Config {
            reason: format!("no fee rate configured for {tier}"),
        })
    }
}

// bincode sizes of the transaction model: version + two length prefixes,
// outpoint + public key + Some(signature), value + script string.
const TX_OVERHEAD: u64 = 4 + 8 + 8;
const INPUT_SIZE: u64 = (32 + 4) + 32 + (1 + 8 + 64);
const OUTPUT_SIZE: u64 = 8 + (8 + 64);

/// Encoded size of a signed transaction with the given shape.
pub fn estimate_size(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD + INPUT_SIZE * inputs as u64 + OUTPUT_SIZE * outputs as u64
}

/// `rate × estimate_size(inputs, outputs)`, saturating.
pub fn fee_for(rate: u64, inputs: usize, outputs: usize) -> u64 {
    rate.saturating_mul(estimate_size(inputs, outputs))
}
