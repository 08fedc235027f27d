//! The wallet ledger.
//!
//! [`WalletLedger`] owns no records itself; keys, coins and transactions
//! live in the [`Repository`]. Each operation reads and writes through a
//! single gateway closure so concurrent chain observations and local
//! spends never interleave inside one logical change.
//!
//! # Spend protocol
//!
//! 1. Under the gateway lock: pick coins, build and sign the transaction,
//!    reserve the chosen outpoints in memory. Nothing is written.
//! 2. Outside the lock: broadcast, under the network deadline.
//! 3. On success, under the lock again: remove the spent coins, insert a
//!    coin for every output paying a wallet key (change, or a spend to the
//!    wallet's own escrow key) and the unconfirmed transaction record.
//!
//! A failed or abandoned broadcast only drops the reservation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_crypto::signing::is_well_formed_script;
use agora_storage::{CoinRecord, KeyRecord, Repository, StorageEngine, TransactionRecord};
use agora_types::config::AppConfig;
use agora_types::{AgoraError, FeeTier, KeyPurpose, OutPoint, Result, Timestamp, TxId, TxState};

use crate::builder::build_spend;
use crate::chain::{with_deadline, Broadcaster, ExchangeRates};
use crate::confirm::{self, is_past_horizon, Transition};
use crate::fees::FeeEstimator;
use crate::keychain::KeySource;
use crate::model::{TxOutput, WalletTx};
use crate::selection::{select_coins, Selection};

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub dust_threshold: u64,
    pub allow_unconfirmed_spend: bool,
    pub dead_horizon_secs: u64,
    pub exchange_currency: String,
    pub network_timeout: Duration,
}

impl LedgerConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            dust_threshold: config.dust_threshold,
            allow_unconfirmed_spend: config.allow_unconfirmed_spend,
            dead_horizon_secs: config.dead_horizon_secs,
            exchange_currency: config.exchange_currency.clone(),
            network_timeout: Duration::from_secs(config.network_timeout_secs),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// Wallet balance split by confirmation.
///
/// `unconfirmed` counts every unspent coin; `confirmed` only those whose
/// creating transaction is confirmed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balance {
    pub unconfirmed: u64,
    pub confirmed: u64,
}

/// Wallet-side effects of applying one transaction.
#[derive(Default)]
struct Effects {
    received: u64,
    spent: u64,
}

impl Effects {
    fn touches_wallet(&self) -> bool {
        self.received > 0 || self.spent > 0
    }

    fn net(&self) -> i64 {
        signed(self.received).saturating_sub(signed(self.spent))
    }
}

struct PreparedSpend {
    selection: Selection,
    txid: TxId,
    raw: Vec<u8>,
    outputs: Vec<TxOutput>,
    change_key: Option<KeyRecord>,
}

/// Outpoints held by an in-flight spend; released on drop.
struct Reservation<'a> {
    reserved: &'a Mutex<HashSet<OutPoint>>,
    outpoints: Vec<OutPoint>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.reserved.lock() {
            for outpoint in &self.outpoints {
                set.remove(outpoint);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WalletLedger
// ---------------------------------------------------------------------------

pub struct WalletLedger {
    repo: Arc<Repository>,
    keys: Arc<dyn KeySource>,
    fees: Arc<dyn FeeEstimator>,
    broadcaster: Arc<dyn Broadcaster>,
    rates: Option<Arc<dyn ExchangeRates>>,
    config: LedgerConfig,
    reserved: Mutex<HashSet<OutPoint>>,
    read_only: AtomicBool,
}

impl WalletLedger {
    pub fn new(
        repo: Arc<Repository>,
        keys: Arc<dyn KeySource>,
        fees: Arc<dyn FeeEstimator>,
        broadcaster: Arc<dyn Broadcaster>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            repo,
            keys,
            fees,
            broadcaster,
            rates: None,
            config,
            reserved: Mutex::new(HashSet::new()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Attaches a source for exchange-rate snapshots.
    pub fn with_rates(mut self, rates: Arc<dyn ExchangeRates>) -> Self {
        self.rates = Some(rates);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// `true` after a consistency violation until [`reconcile`](Self::reconcile)
    /// succeeds.
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    // -- Reads ---------------------------------------------------------------

    pub fn get_balance(&self) -> Result<Balance> {
        self.repo.with(|store| {
            let txs = store.transactions()?;
            let mut balance = Balance::default();
            for coin in store.coins()?.list()? {
                balance.unconfirmed = balance.unconfirmed.saturating_add(coin.value);
                if confirmed_owner(&txs, &coin.outpoint.txid)? {
                    balance.confirmed = balance.confirmed.saturating_add(coin.value);
                }
            }
            Ok(balance)
        })
    }

    /// All transaction records, newest first.
    pub fn transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.repo.with(|store| store.transactions()?.list())
    }

    pub fn coins(&self) -> Result<Vec<CoinRecord>> {
        self.repo.with(|store| store.coins()?.list())
    }

    pub fn keys(&self) -> Result<Vec<KeyRecord>> {
        self.repo.with(|store| store.keys()?.list())
    }

    // -- Keys ----------------------------------------------------------------

    /// First unused receive key, deriving and persisting a new one when
    /// every issued key has been used.
    pub fn next_receive_address(&self) -> Result<KeyRecord> {
        self.next_key(KeyPurpose::Receive)
    }

    pub fn next_key(&self, purpose: KeyPurpose) -> Result<KeyRecord> {
        self.repo.with(|store| {
            let keys = store.keys()?;
            if let Some(record) = keys.first_unused(purpose)? {
                return Ok(record);
            }
            let record = self.derive_record(purpose, keys.next_index(purpose)?)?;
            keys.put(&record)?;
            tracing::debug!(%purpose, index = record.index, "derived new wallet key");
            Ok(record)
        })
    }

    fn derive_record(&self, purpose: KeyPurpose, index: u32) -> Result<KeyRecord> {
        let public_key = self.keys.public_key(purpose, index)?;
        Ok(KeyRecord {
            script_pubkey: public_key.script(),
            public_key,
            purpose,
            used: false,
            index,
        })
    }

    // -- Spend ---------------------------------------------------------------

    /// Pays `amount` to the spend script `destination`.
    ///
    /// # Errors
    ///
    /// - [`AgoraError::Validation`] for a zero or dust amount or a
    ///   malformed destination, before any storage access.
    /// - [`AgoraError::InsufficientFunds`] when eligible coins cannot
    ///   cover `amount` plus fee.
    /// - [`AgoraError::Network`] when fee estimation or broadcast fails;
    ///   nothing is written in that case.
    /// - [`AgoraError::Consistency`] while the ledger is read-only.
    pub async fn spend(&self, amount: u64, destination: &str, tier: FeeTier) -> Result<TransactionRecord> {
        self.validate_spend(amount, destination)?;
        self.ensure_writable()?;

        let rate = with_deadline(self.config.network_timeout, "fee estimate", self.fees.fee_rate(tier)).await?;
        let (prepared, _reservation) = self.prepare_spend(amount, destination, rate)?;

        tracing::info!(
            txid = %prepared.txid,
            amount,
            fee = prepared.selection.fee,
            inputs = prepared.selection.coins.len(),
            %tier,
            "broadcasting spend"
        );
        if let Err(e) = with_deadline(
            self.config.network_timeout,
            "broadcast",
            self.broadcaster.submit(&prepared.raw),
        )
        .await
        {
            tracing::warn!(txid = %prepared.txid, error = %e, "broadcast failed, spend abandoned");
            return Err(e);
        }

        self.commit_spend(&prepared)
    }

    fn validate_spend(&self, amount: u64, destination: &str) -> Result<()> {
        if amount == 0 {
            return Err(AgoraError::Validation {
                reason: "spend amount must be positive".into(),
            });
        }
        if amount <= self.config.dust_threshold {
            return Err(AgoraError::Validation {
                reason: format!(
                    "spend amount {amount} is at or below the dust threshold {}",
                    self.config.dust_threshold
                ),
            });
        }
        if !is_well_formed_script(destination) {
            return Err(AgoraError::Validation {
                reason: format!("malformed destination script '{destination}'"),
            });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(AgoraError::Consistency {
                reason: "ledger is read-only until reconciled".into(),
            });
        }
        Ok(())
    }

    fn prepare_spend(&self, amount: u64, destination: &str, rate: u64) -> Result<(PreparedSpend, Reservation<'_>)> {
        let prepared = self.repo.with(|store| {
            let mut reserved = self.reserved.lock().map_err(|_| AgoraError::Persistence {
                reason: "coin reservation lock poisoned".into(),
            })?;

            let txs = store.transactions()?;
            let mut candidates = Vec::new();
            for coin in store.coins()?.list()? {
                if reserved.contains(&coin.outpoint) {
                    continue;
                }
                if !self.config.allow_unconfirmed_spend && !confirmed_owner(&txs, &coin.outpoint.txid)? {
                    continue;
                }
                candidates.push(coin);
            }

            let selection = select_coins(&candidates, amount, rate, self.config.dust_threshold)?;
            if !selection.is_balanced() {
                return Err(self.violation(format!(
                    "selection total {} != amount {} + fee {} + change {}",
                    selection.total(),
                    selection.amount,
                    selection.fee,
                    selection.change
                )));
            }

            let keys = store.keys()?;
            let change_key = if selection.has_change() {
                match keys.first_unused(KeyPurpose::Change)? {
                    Some(record) => Some(record),
                    None => Some(self.derive_record(KeyPurpose::Change, keys.next_index(KeyPurpose::Change)?)?),
                }
            } else {
                None
            };

            let tx = build_spend(
                &selection,
                destination,
                change_key.as_ref().map(|k| k.script_pubkey.as_str()),
                |coin| {
                    let owner = keys.get_by_script(&coin.script_pubkey)?.ok_or_else(|| {
                        AgoraError::Consistency {
                            reason: format!("coin {} has no wallet key", coin.outpoint),
                        }
                    })?;
                    self.keys.signing_key(owner.purpose, owner.index)
                },
            )?;

            for coin in &selection.coins {
                reserved.insert(coin.outpoint);
            }
            Ok(PreparedSpend {
                txid: tx.txid()?,
                raw: tx.encode()?,
                outputs: tx.outputs,
                selection,
                change_key,
            })
        })?;

        let reservation = Reservation {
            reserved: &self.reserved,
            outpoints: prepared.selection.coins.iter().map(|c| c.outpoint).collect(),
        };
        Ok((prepared, reservation))
    }

    fn commit_spend(&self, prepared: &PreparedSpend) -> Result<TransactionRecord> {
        let now = Timestamp::now();
        let rate = self.rate_snapshot();

        self.repo.with(|store| {
            let coins = store.coins()?;
            let keys = store.keys()?;
            let txs = store.transactions()?;

            for coin in &prepared.selection.coins {
                if !coins.remove(&coin.outpoint)? {
                    tracing::debug!(outpoint = %coin.outpoint, "selected coin already consumed by the chain feed");
                }
            }

            if let Some(change_key) = &prepared.change_key {
                keys.put(&KeyRecord {
                    used: true,
                    ..change_key.clone()
                })?;
            }

            let mut received: u64 = 0;
            for (i, output) in prepared.outputs.iter().enumerate() {
                if !keys.is_wallet_script(&output.script_pubkey)? {
                    continue;
                }
                coins.put(&CoinRecord {
                    outpoint: OutPoint::new(prepared.txid, output_index(i)?),
                    value: output.value,
                    script_pubkey: output.script_pubkey.clone(),
                })?;
                keys.mark_used(&output.script_pubkey)?;
                received = received.saturating_add(output.value);
            }
            let net = signed(received).saturating_sub(signed(prepared.selection.total()));

            // The chain feed may have seen the broadcast before this commit.
            let record = match txs.get(&prepared.txid)? {
                Some(seen) => TransactionRecord {
                    value: net,
                    last_seen: now,
                    ..seen
                },
                None => TransactionRecord {
                    txid: prepared.txid,
                    raw_tx: prepared.raw.clone(),
                    height: None,
                    state: TxState::Unconfirmed,
                    timestamp: now,
                    value: net,
                    exchange_rate: rate,
                    exchange_currency: self.config.exchange_currency.clone(),
                    last_seen: now,
                },
            };
            txs.put(&record)?;
            self.check_record(&record)?;

            tracing::info!(txid = %record.txid, value = record.value, "spend recorded");
            Ok(record)
        })
    }

    // -- Observation ---------------------------------------------------------

    /// Applies a transaction seen on the chain feed.
    ///
    /// Returns `None` for a transaction that neither pays nor spends the
    /// wallet and is not already recorded.
    pub fn observe_transaction(&self, raw_tx: &[u8], height: Option<u32>) -> Result<Option<TransactionRecord>> {
        self.observe_transaction_at(raw_tx, height, Timestamp::now())
    }

    /// [`observe_transaction`](Self::observe_transaction) with an explicit
    /// observation time.
    pub fn observe_transaction_at(
        &self,
        raw_tx: &[u8],
        height: Option<u32>,
        now: Timestamp,
    ) -> Result<Option<TransactionRecord>> {
        let tx = WalletTx::decode(raw_tx)?;
        let txid = tx.txid()?;
        let rate = self.rate_snapshot();

        self.repo.with(|store| {
            let txs = store.transactions()?;
            let existing = txs.get(&txid)?;

            let needs_effects = existing.as_ref().map_or(true, |r| r.state == TxState::Dead);
            let mut value = existing.as_ref().map_or(0, |r| r.value);
            if needs_effects {
                let effects = apply_effects(store, &tx, txid)?;
                if existing.is_none() && !effects.touches_wallet() {
                    return Ok(None);
                }
                value = effects.net();
            }

            let (state, new_height, transition) = confirm::observe(existing.as_ref().map(|r| (r.state, r.height)), height);
            let record = match existing {
                Some(prev) => TransactionRecord {
                    raw_tx: raw_tx.to_vec(),
                    height: new_height,
                    state,
                    value,
                    last_seen: now,
                    ..prev
                },
                None => TransactionRecord {
                    txid,
                    raw_tx: raw_tx.to_vec(),
                    height: new_height,
                    state,
                    timestamp: now,
                    value,
                    exchange_rate: rate,
                    exchange_currency: self.config.exchange_currency.clone(),
                    last_seen: now,
                },
            };
            txs.put(&record)?;

            match transition {
                Transition::New => tracing::info!(%txid, %state, value, "wallet transaction observed"),
                Transition::Confirmed(h) => tracing::info!(%txid, height = h, "transaction confirmed"),
                Transition::Reorged { from_height } => {
                    tracing::warn!(%txid, from_height, "transaction reorganized out of its block")
                }
                Transition::Revived => tracing::info!(%txid, %state, "dead transaction observed again"),
                Transition::Unchanged => tracing::trace!(%txid, "transaction re-observed"),
            }

            self.check_record(&record)?;
            Ok(Some(record))
        })
    }

    // -- Dead sweep ----------------------------------------------------------

    /// Marks unconfirmed transactions unseen past the dead horizon as dead,
    /// removing the coins they created and restoring the wallet coins they
    /// spent. Returns the txids that died.
    pub fn sweep_dead(&self, now: Timestamp) -> Result<Vec<TxId>> {
        let horizon = self.config.dead_horizon_secs;
        self.repo.with(|store| {
            let txs = store.transactions()?;
            let coins = store.coins()?;
            let keys = store.keys()?;
            let snapshot = txs.list()?;
            let mut died: Vec<TxId> = Vec::new();

            for record in snapshot.iter().filter(|r| is_past_horizon(r, &now, horizon)) {
                let tx = match WalletTx::decode(&record.raw_tx) {
                    Ok(tx) => tx,
                    Err(e) => {
                        tracing::warn!(txid = %record.txid, error = %e, "cannot decode stored transaction, skipping");
                        continue;
                    }
                };

                for index in 0..tx.outputs.len() {
                    coins.remove(&OutPoint::new(record.txid, output_index(index)?))?;
                }

                for input in &tx.inputs {
                    let previous = input.previous;
                    if coins.contains(&previous)? || spent_by_other_live(&snapshot, &died, &record.txid, &previous) {
                        continue;
                    }
                    let Some(funding) = txs.get(&previous.txid)? else {
                        continue;
                    };
                    if !funding.is_live() {
                        continue;
                    }
                    let Ok(funding_tx) = WalletTx::decode(&funding.raw_tx) else {
                        continue;
                    };
                    let Some(output) = usize::try_from(previous.index).ok().and_then(|i| funding_tx.outputs.get(i)) else {
                        continue;
                    };
                    if keys.is_wallet_script(&output.script_pubkey)? {
                        coins.put(&CoinRecord {
                            outpoint: previous,
                            value: output.value,
                            script_pubkey: output.script_pubkey.clone(),
                        })?;
                        tracing::debug!(outpoint = %previous, "coin restored from dead spend");
                    }
                }

                let dead = TransactionRecord {
                    state: TxState::Dead,
                    height: None,
                    ..record.clone()
                };
                txs.put(&dead)?;
                died.push(record.txid);
                tracing::info!(txid = %record.txid, "transaction marked dead");
            }
            Ok(died)
        })
    }

    // -- Consistency ---------------------------------------------------------

    /// Re-verifies every ledger invariant over the full store.
    ///
    /// Clears read-only mode when they hold.
    ///
    /// # Errors
    ///
    /// [`AgoraError::Consistency`] listing the violations; the ledger stays
    /// (or becomes) read-only.
    pub fn reconcile(&self) -> Result<()> {
        let problems = self.repo.with(audit)?;
        if problems.is_empty() {
            if self.read_only.swap(false, Ordering::SeqCst) {
                tracing::info!("ledger reconciled, spends re-enabled");
            }
            return Ok(());
        }
        Err(self.violation(problems.join("; ")))
    }

    fn check_record(&self, record: &TransactionRecord) -> Result<()> {
        if record.height_matches_state() {
            return Ok(());
        }
        Err(self.violation(format!(
            "transaction {} is {} with height {:?}",
            record.txid, record.state, record.height
        )))
    }

    fn violation(&self, reason: String) -> AgoraError {
        self.read_only.store(true, Ordering::SeqCst);
        tracing::error!(%reason, "ledger consistency violation, entering read-only mode");
        AgoraError::Consistency { reason }
    }

    fn rate_snapshot(&self) -> Option<f64> {
        self.rates
            .as_ref()
            .and_then(|r| r.rate(&self.config.exchange_currency))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn signed(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn output_index(i: usize) -> Result<u32> {
    u32::try_from(i).map_err(|_| AgoraError::Validation {
        reason: format!("output index {i} out of range"),
    })
}

fn confirmed_owner(txs: &agora_storage::transactions::TransactionStore<'_>, txid: &TxId) -> Result<bool> {
    Ok(txs
        .get(txid)?
        .map_or(false, |t| t.state == TxState::Confirmed))
}

/// Adds the transaction's wallet outputs as coins and removes wallet
/// coins its inputs consume.
fn apply_effects(store: &StorageEngine, tx: &WalletTx, txid: TxId) -> Result<Effects> {
    let keys = store.keys()?;
    let coins = store.coins()?;
    let mut effects = Effects::default();

    for (i, output) in tx.outputs.iter().enumerate() {
        if !keys.is_wallet_script(&output.script_pubkey)? {
            continue;
        }
        coins.put(&CoinRecord {
            outpoint: OutPoint::new(txid, output_index(i)?),
            value: output.value,
            script_pubkey: output.script_pubkey.clone(),
        })?;
        keys.mark_used(&output.script_pubkey)?;
        effects.received = effects.received.saturating_add(output.value);
    }

    for input in &tx.inputs {
        if let Some(coin) = coins.get(&input.previous)? {
            coins.remove(&input.previous)?;
            effects.spent = effects.spent.saturating_add(coin.value);
        }
    }
    Ok(effects)
}

/// Whether a live transaction other than `except` (and not already dead
/// in this sweep) spends `outpoint`.
fn spent_by_other_live(snapshot: &[TransactionRecord], died: &[TxId], except: &TxId, outpoint: &OutPoint) -> bool {
    snapshot
        .iter()
        .filter(|r| r.is_live() && &r.txid != except && !died.contains(&r.txid))
        .filter_map(|r| WalletTx::decode(&r.raw_tx).ok())
        .any(|tx| tx.inputs.iter().any(|i| &i.previous == outpoint))
}

/// Full-store invariant check.
fn audit(store: &StorageEngine) -> Result<Vec<String>> {
    let txs = store.transactions()?;
    let mut problems = Vec::new();

    for record in txs.list()? {
        if !record.height_matches_state() {
            problems.push(format!(
                "transaction {} is {} with height {:?}",
                record.txid, record.state, record.height
            ));
        }
    }

    for coin in store.coins()?.list()? {
        match txs.get(&coin.outpoint.txid)? {
            None => problems.push(format!("coin {} has no owning transaction", coin.outpoint)),
            Some(owner) if !owner.is_live() => {
                problems.push(format!("coin {} belongs to dead transaction", coin.outpoint))
            }
            Some(_) => {}
        }
    }
    Ok(problems)
}
