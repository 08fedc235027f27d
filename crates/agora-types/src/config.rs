//! Node configuration with defaults.
//!
//! Every operational constant of the mailbox schedulers and the wallet
//! ledger lives here. Values are loaded from the node's JSON config file
//! and validated once at startup.

use serde::{Deserialize, Serialize};

use crate::{AgoraError, Result};

/// Global node configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // ----- Pointer directory ----------------------------------------------
    /// Validity window of a published pointer, in seconds.
    ///
    /// Authored pointers older than half of this are republished.
    pub pointer_ttl_secs: u64,

    /// Seconds between republish scheduler ticks.
    pub republish_interval_secs: u64,

    // ----- Mailbox ----------------------------------------------------------
    /// Seconds between mailbox fetch cycles.
    pub mailbox_poll_interval_secs: u64,

    // ----- Network ----------------------------------------------------------
    /// Deadline applied to every lookup, content and broadcast call.
    pub network_timeout_secs: u64,

    /// First backoff step after a failed scheduler cycle, in seconds.
    pub backoff_base_secs: u64,

    /// Upper bound on scheduler backoff, in seconds.
    pub backoff_cap_secs: u64,

    // ----- Wallet ledger ----------------------------------------------------
    /// An unconfirmed transaction unseen for longer than this is dead.
    pub dead_horizon_secs: u64,

    /// Seconds between dead-transaction sweeps.
    pub dead_sweep_interval_secs: u64,

    /// Residuals at or below this value are folded into the fee instead
    /// of creating a change output.
    pub dust_threshold: u64,

    /// Whether coin selection may use coins from unconfirmed transactions.
    pub allow_unconfirmed_spend: bool,

    /// Currency recorded alongside each transaction's exchange-rate snapshot.
    pub exchange_currency: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pointer_ttl_secs: 7 * 24 * 3600,
            republish_interval_secs: 3600,
            mailbox_poll_interval_secs: 600,
            network_timeout_secs: 30,
            backoff_base_secs: 60,
            backoff_cap_secs: 3600,
            dead_horizon_secs: 48 * 3600,
            dead_sweep_interval_secs: 600,
            dust_threshold: 546,
            allow_unconfirmed_spend: false,
            exchange_currency: "USD".into(),
        }
    }
}

impl AppConfig {
    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("pointer_ttl_secs", self.pointer_ttl_secs),
            ("republish_interval_secs", self.republish_interval_secs),
            ("mailbox_poll_interval_secs", self.mailbox_poll_interval_secs),
            ("network_timeout_secs", self.network_timeout_secs),
            ("backoff_base_secs", self.backoff_base_secs),
            ("dead_horizon_secs", self.dead_horizon_secs),
            ("dead_sweep_interval_secs", self.dead_sweep_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(AgoraError::Config {
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }

        if self.backoff_cap_secs < self.backoff_base_secs {
            return Err(AgoraError::Config {
                reason: "backoff_cap_secs must be >= backoff_base_secs".into(),
            });
        }

        // A republish interval longer than half the TTL would let pointers
        // lapse between ticks.
        if self.republish_interval_secs > self.pointer_ttl_secs / 2 {
            return Err(AgoraError::Config {
                reason: "republish_interval_secs must not exceed pointer_ttl_secs / 2".into(),
            });
        }

        if self.exchange_currency.trim().is_empty() {
            return Err(AgoraError::Config {
                reason: "exchange_currency must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Age after which an authored pointer is due for republish.
    pub fn republish_after_secs(&self) -> u64 {
        self.pointer_ttl_secs / 2
    }
}
