//! Integration tests for the wallet ledger.
//!
//! Every test opens its own plaintext store; the network side is a
//! recording broadcaster and a fixed fee table.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use agora_crypto::kdf::Argon2Params;
use agora_crypto::mnemonic::Mnemonic;
use agora_crypto::signing::Keypair;
use agora_storage::{CoinRecord, Repository};
use agora_types::{AgoraError, FeeTier, KeyPurpose, OutPoint, Result, Timestamp, TxId, TxState};
use agora_wallet::fees::fee_for;
use agora_wallet::{
    Balance, Broadcaster, ExchangeRates, LedgerConfig, MnemonicKeySource, StaticFeeEstimator, TxInput, TxOutput,
    WalletLedger, WalletTx,
};
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const COIN: u64 = 100_000_000;
const RATE: u64 = 2_000;
const HORIZON_SECS: u64 = 3_600;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "agora-ledger-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ))
}

#[derive(Default)]
struct RecordingBroadcaster {
    submitted: Mutex<Vec<Vec<u8>>>,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingBroadcaster {
    fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn submit(&self, raw_tx: &[u8]) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AgoraError::Network {
                reason: "peer refused connection".into(),
            });
        }
        if let Ok(mut s) = self.submitted.lock() {
            s.push(raw_tx.to_vec());
        }
        Ok(())
    }
}

struct FixedRates(f64);

impl ExchangeRates for FixedRates {
    fn rate(&self, _currency: &str) -> Option<f64> {
        Some(self.0)
    }
}

struct Harness {
    repo: Arc<Repository>,
    broadcaster: Arc<RecordingBroadcaster>,
    ledger: Arc<WalletLedger>,
}

fn config() -> LedgerConfig {
    LedgerConfig {
        dust_threshold: 546,
        allow_unconfirmed_spend: false,
        dead_horizon_secs: HORIZON_SECS,
        exchange_currency: "USD".into(),
        network_timeout: Duration::from_secs(5),
    }
}

fn harness_with(broadcaster: RecordingBroadcaster, rates: Option<f64>) -> Result<Harness> {
    let repo = Arc::new(Repository::open_with_params(&temp_dir(), "", Argon2Params::light())?);
    let broadcaster = Arc::new(broadcaster);
    let keys = Arc::new(MnemonicKeySource::new(&Mnemonic::generate()?)?);
    let fees = Arc::new(StaticFeeEstimator::new(RATE, RATE, RATE));
    let mut ledger = WalletLedger::new(repo.clone(), keys, fees, broadcaster.clone(), config());
    if let Some(rate) = rates {
        ledger = ledger.with_rates(Arc::new(FixedRates(rate)));
    }
    Ok(Harness {
        repo,
        broadcaster,
        ledger: Arc::new(ledger),
    })
}

fn harness() -> Result<Harness> {
    harness_with(RecordingBroadcaster::default(), None)
}

/// Hands every broadcast to the ledger's chain feed before `submit`
/// returns, so the feed records the spend ahead of its commit.
#[derive(Default)]
struct FeedingBroadcaster {
    ledger: OnceLock<Weak<WalletLedger>>,
    height: Option<u32>,
}

#[async_trait]
impl Broadcaster for FeedingBroadcaster {
    async fn submit(&self, raw_tx: &[u8]) -> Result<()> {
        let ledger = self
            .ledger
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| AgoraError::Network {
                reason: "no ledger attached".into(),
            })?;
        ledger.observe_transaction(raw_tx, self.height)?;
        Ok(())
    }
}

fn feeding_ledger(height: Option<u32>) -> Result<Arc<WalletLedger>> {
    let repo = Arc::new(Repository::open_with_params(&temp_dir(), "", Argon2Params::light())?);
    let feed = Arc::new(FeedingBroadcaster {
        height,
        ..FeedingBroadcaster::default()
    });
    let keys = Arc::new(MnemonicKeySource::new(&Mnemonic::generate()?)?);
    let fees = Arc::new(StaticFeeEstimator::new(RATE, RATE, RATE));
    let ledger = Arc::new(WalletLedger::new(repo, keys, fees, feed.clone(), config()));
    let _ = feed.ledger.set(Arc::downgrade(&ledger));
    Ok(ledger)
}

fn external_script() -> String {
    Keypair::from_seed(&[0xEE; 32]).public_key().script()
}

/// A transaction from outside the wallet paying `value` to `script`.
fn incoming(value: u64, script: &str) -> Result<WalletTx> {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut prev = [0xAAu8; 32];
    prev[..4].copy_from_slice(&n.to_le_bytes());
    Ok(WalletTx::new(
        vec![TxInput {
            previous: OutPoint::new(TxId::new(prev), 0),
            public_key: Keypair::from_seed(&[0xEE; 32]).public_key(),
            signature: None,
        }],
        vec![TxOutput {
            value,
            script_pubkey: script.to_string(),
        }],
    ))
}

/// Pays `value` to the next receive address and feeds it to the ledger.
fn fund_at(ledger: &WalletLedger, value: u64, height: Option<u32>, now: Timestamp) -> Result<TxId> {
    let key = ledger.next_receive_address()?;
    let tx = incoming(value, &key.script_pubkey)?;
    ledger.observe_transaction_at(&tx.encode()?, height, now)?;
    tx.txid()
}

fn fund(ledger: &WalletLedger, value: u64, height: Option<u32>) -> Result<TxId> {
    fund_at(ledger, value, height, Timestamp::now())
}

/// Sum of live transaction values must equal the sum of unspent coins.
fn assert_balance_invariant(ledger: &WalletLedger) -> Result<()> {
    let live: i64 = ledger
        .transactions()?
        .iter()
        .filter(|t| t.is_live())
        .map(|t| t.value)
        .sum();
    let coins: u64 = ledger.coins()?.iter().map(|c| c.value).sum();
    assert_eq!(live, coins as i64);
    Ok(())
}

// ---------------------------------------------------------------------------
// Balance and addresses
// ---------------------------------------------------------------------------

#[test]
fn balance_splits_confirmed_and_unconfirmed() -> Result<()> {
    let h = harness()?;
    fund(&h.ledger, COIN, Some(100))?;
    fund(&h.ledger, 2 * COIN, Some(101))?;
    fund(&h.ledger, COIN / 2, None)?;
    assert_eq!(
        h.ledger.get_balance()?,
        Balance {
            unconfirmed: 3 * COIN + COIN / 2,
            confirmed: 3 * COIN
        }
    );
    assert_balance_invariant(&h.ledger)
}

#[test]
fn receive_address_reused_until_paid() -> Result<()> {
    let h = harness()?;
    let first = h.ledger.next_receive_address()?;
    let again = h.ledger.next_receive_address()?;
    assert_eq!(first, again);
    assert_eq!(first.index, 0);
    assert_eq!(first.purpose, KeyPurpose::Receive);

    let tx = incoming(10_000, &first.script_pubkey)?;
    h.ledger.observe_transaction(&tx.encode()?, Some(1))?;

    let next = h.ledger.next_receive_address()?;
    assert_eq!(next.index, 1);
    assert_ne!(next.script_pubkey, first.script_pubkey);
    assert!(h.ledger.keys()?.iter().any(|k| k.index == 0 && k.used));
    Ok(())
}

#[test]
fn unrelated_transaction_is_ignored() -> Result<()> {
    let h = harness()?;
    let tx = incoming(50_000, &external_script())?;
    assert!(h.ledger.observe_transaction(&tx.encode()?, Some(5))?.is_none());
    assert!(h.ledger.transactions()?.is_empty());
    Ok(())
}

#[test]
fn malformed_transaction_is_validation_error() -> Result<()> {
    let h = harness()?;
    let result = h.ledger.observe_transaction(&[0xFF, 0x01, 0x02], None);
    assert!(matches!(result, Err(AgoraError::Validation { .. })));
    Ok(())
}

#[test]
fn observation_records_exchange_rate() -> Result<()> {
    let h = harness_with(RecordingBroadcaster::default(), Some(61_234.5))?;
    let txid = fund(&h.ledger, COIN, Some(3))?;
    let record = h
        .ledger
        .transactions()?
        .into_iter()
        .find(|t| t.txid == txid)
        .ok_or_else(|| AgoraError::Persistence { reason: "missing".into() })?;
    assert_eq!(record.exchange_rate, Some(61_234.5));
    assert_eq!(record.exchange_currency, "USD");
    assert_eq!(record.value, COIN as i64);
    Ok(())
}

// ---------------------------------------------------------------------------
// Spending
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spend_with_change() -> Result<()> {
    let h = harness()?;
    for height in 10..13 {
        fund(&h.ledger, COIN, Some(height))?;
    }

    let destination = external_script();
    let amount = COIN + COIN / 2;
    let record = h.ledger.spend(amount, &destination, FeeTier::Economic).await?;

    let fee = fee_for(RATE, 2, 2);
    let change = 2 * COIN - amount - fee;
    assert_eq!(record.state, TxState::Unconfirmed);
    assert_eq!(record.height, None);
    assert_eq!(record.value, -((amount + fee) as i64));

    let sent = h.broadcaster.submitted();
    assert_eq!(sent.len(), 1);
    let tx = WalletTx::decode(&sent[0])?;
    tx.verify_signatures()?;
    assert_eq!(tx.txid()?, record.txid);
    assert_eq!(tx.inputs.len(), 2);
    assert_eq!(tx.outputs[0].script_pubkey, destination);
    assert_eq!(tx.outputs[0].value, amount);
    assert_eq!(tx.outputs[1].value, change);

    let coins = h.ledger.coins()?;
    assert_eq!(coins.len(), 2);
    let change_coin = coins
        .iter()
        .find(|c| c.outpoint == OutPoint::new(record.txid, 1))
        .ok_or_else(|| AgoraError::Persistence { reason: "change coin missing".into() })?;
    assert_eq!(change_coin.value, change);
    assert_eq!(
        h.ledger.get_balance()?,
        Balance {
            unconfirmed: COIN + change,
            confirmed: COIN
        }
    );
    assert!(h
        .ledger
        .keys()?
        .iter()
        .any(|k| k.purpose == KeyPurpose::Change && k.used && k.script_pubkey == change_coin.script_pubkey));
    assert_balance_invariant(&h.ledger)
}

#[tokio::test]
async fn insufficient_funds_leaves_store_untouched() -> Result<()> {
    let h = harness()?;
    for height in 10..13 {
        fund(&h.ledger, COIN, Some(height))?;
    }
    let before = h.repo.fingerprints()?;

    let result = h.ledger.spend(10 * COIN, &external_script(), FeeTier::Normal).await;
    match result {
        Err(AgoraError::InsufficientFunds { needed, available }) => {
            assert_eq!(available, 3 * COIN);
            assert_eq!(needed, 10 * COIN + fee_for(RATE, 3, 1));
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }
    assert_eq!(h.repo.fingerprints()?, before);
    assert!(h.broadcaster.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn unconfirmed_coins_are_not_spendable_by_default() -> Result<()> {
    let h = harness()?;
    fund(&h.ledger, COIN, None)?;
    let result = h.ledger.spend(COIN / 2, &external_script(), FeeTier::Normal).await;
    assert!(matches!(
        result,
        Err(AgoraError::InsufficientFunds { available: 0, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn invalid_spend_requests_rejected() -> Result<()> {
    let h = harness()?;
    fund(&h.ledger, COIN, Some(1))?;
    let dest = external_script();

    for (amount, destination) in [(0, dest.as_str()), (546, dest.as_str()), (10_000, "not-a-script")] {
        let result = h.ledger.spend(amount, destination, FeeTier::Normal).await;
        assert!(matches!(result, Err(AgoraError::Validation { .. })), "{amount} {destination}");
    }
    assert!(h.broadcaster.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_broadcast_writes_nothing() -> Result<()> {
    let h = harness()?;
    fund(&h.ledger, COIN, Some(1))?;
    let before = h.repo.fingerprints()?;

    h.broadcaster.fail.store(true, Ordering::SeqCst);
    let result = h.ledger.spend(COIN / 4, &external_script(), FeeTier::Priority).await;
    assert!(matches!(result, Err(AgoraError::Network { .. })));
    assert_eq!(h.repo.fingerprints()?, before);

    // The reservation is released, so the same coin can be spent again.
    h.broadcaster.fail.store(false, Ordering::SeqCst);
    h.ledger.spend(COIN / 4, &external_script(), FeeTier::Priority).await?;
    assert_eq!(h.broadcaster.submitted().len(), 1);
    assert_balance_invariant(&h.ledger)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_spends_never_share_a_coin() -> Result<()> {
    let h = harness_with(
        RecordingBroadcaster {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        },
        None,
    )?;
    fund(&h.ledger, COIN, Some(1))?;
    fund(&h.ledger, COIN, Some(2))?;

    let a = {
        let ledger = h.ledger.clone();
        tokio::spawn(async move { ledger.spend(COIN / 2, &external_script(), FeeTier::Normal).await })
    };
    let b = {
        let ledger = h.ledger.clone();
        tokio::spawn(async move { ledger.spend(COIN / 2, &external_script(), FeeTier::Normal).await })
    };
    let (a, b) = (
        a.await.map_err(|e| AgoraError::Consistency { reason: e.to_string() })?,
        b.await.map_err(|e| AgoraError::Consistency { reason: e.to_string() })?,
    );
    assert_ne!(a?.txid, b?.txid);

    let mut spent: Vec<OutPoint> = Vec::new();
    for raw in h.broadcaster.submitted() {
        for input in WalletTx::decode(&raw)?.inputs {
            assert!(!spent.contains(&input.previous), "coin {} spent twice", input.previous);
            spent.push(input.previous);
        }
    }
    assert_eq!(spent.len(), 2);
    assert_balance_invariant(&h.ledger)
}

#[tokio::test]
async fn feed_seeing_spend_first_is_merged() -> Result<()> {
    let h = harness()?;
    fund(&h.ledger, COIN, Some(1))?;
    let record = h.ledger.spend(COIN / 2, &external_script(), FeeTier::Normal).await?;

    let raw = h.broadcaster.submitted().remove(0);
    let confirmed = h
        .ledger
        .observe_transaction(&raw, Some(2))?
        .ok_or_else(|| AgoraError::Persistence { reason: "spend not tracked".into() })?;
    assert_eq!(confirmed.txid, record.txid);
    assert_eq!(confirmed.state, TxState::Confirmed);
    assert_eq!(confirmed.value, record.value);
    assert_eq!(h.ledger.transactions()?.len(), 2);
    assert_balance_invariant(&h.ledger)
}

/// A spend of one COIN paying half to the wallet's own escrow key keeps
/// both the escrow output and the change, so only the fee leaves.
fn assert_escrow_spend_recorded(ledger: &WalletLedger, record_txid: TxId, escrow_script: &str) -> Result<()> {
    let fee = fee_for(RATE, 1, 2);
    let change = COIN - COIN / 2 - fee;

    let record = ledger
        .transactions()?
        .into_iter()
        .find(|t| t.txid == record_txid)
        .ok_or_else(|| AgoraError::Persistence { reason: "spend not recorded".into() })?;
    assert_eq!(record.state, TxState::Confirmed);
    assert_eq!(record.value, -(fee as i64));

    let coins = ledger.coins()?;
    assert_eq!(coins.len(), 2);
    let escrow_coin = coins
        .iter()
        .find(|c| c.outpoint == OutPoint::new(record_txid, 0))
        .ok_or_else(|| AgoraError::Persistence { reason: "escrow coin missing".into() })?;
    assert_eq!(escrow_coin.value, COIN / 2);
    assert_eq!(escrow_coin.script_pubkey, escrow_script);
    assert!(coins
        .iter()
        .any(|c| c.outpoint == OutPoint::new(record_txid, 1) && c.value == change));

    assert!(ledger
        .keys()?
        .iter()
        .any(|k| k.purpose == KeyPurpose::Escrow && k.used && k.script_pubkey == escrow_script));
    assert_eq!(
        ledger.get_balance()?,
        Balance {
            unconfirmed: COIN - fee,
            confirmed: COIN - fee
        }
    );
    assert_balance_invariant(ledger)
}

#[tokio::test]
async fn spend_to_own_escrow_key_keeps_the_coin() -> Result<()> {
    let h = harness()?;
    fund(&h.ledger, COIN, Some(1))?;
    let escrow = h.ledger.next_key(KeyPurpose::Escrow)?;

    let record = h.ledger.spend(COIN / 2, &escrow.script_pubkey, FeeTier::Normal).await?;
    assert_eq!(record.value, -(fee_for(RATE, 1, 2) as i64));
    assert_eq!(h.ledger.get_balance()?.unconfirmed, COIN - fee_for(RATE, 1, 2));

    let raw = h.broadcaster.submitted().remove(0);
    h.ledger.observe_transaction(&raw, Some(2))?;
    assert_eq!(h.ledger.transactions()?.len(), 2);
    assert_escrow_spend_recorded(&h.ledger, record.txid, &escrow.script_pubkey)
}

#[tokio::test]
async fn spend_to_own_escrow_key_seen_by_feed_first() -> Result<()> {
    let ledger = feeding_ledger(Some(2))?;
    fund(&ledger, COIN, Some(1))?;
    let escrow = ledger.next_key(KeyPurpose::Escrow)?;

    let record = ledger.spend(COIN / 2, &escrow.script_pubkey, FeeTier::Normal).await?;
    assert_eq!(record.state, TxState::Confirmed);
    assert_eq!(record.height, Some(2));
    assert_eq!(ledger.transactions()?.len(), 2);
    assert_escrow_spend_recorded(&ledger, record.txid, &escrow.script_pubkey)
}

// ---------------------------------------------------------------------------
// Confirmation lifecycle
// ---------------------------------------------------------------------------

#[test]
fn reorg_then_dead_then_revived() -> Result<()> {
    let h = harness()?;
    let t0 = Timestamp::from_millis(1_700_000_000_000);
    let key = h.ledger.next_receive_address()?;
    let tx = incoming(COIN, &key.script_pubkey)?;
    let raw = tx.encode()?;
    let txid = tx.txid()?;

    h.ledger.observe_transaction_at(&raw, Some(100), t0)?;
    assert_eq!(h.ledger.get_balance()?.confirmed, COIN);

    let reorged = h
        .ledger
        .observe_transaction_at(&raw, None, t0)?
        .ok_or_else(|| AgoraError::Persistence { reason: "untracked".into() })?;
    assert_eq!(reorged.state, TxState::Unconfirmed);
    assert_eq!(reorged.height, None);
    assert_eq!(
        h.ledger.get_balance()?,
        Balance {
            unconfirmed: COIN,
            confirmed: 0
        }
    );

    // Not yet past the horizon.
    assert!(h.ledger.sweep_dead(t0.plus_secs(HORIZON_SECS - 1))?.is_empty());

    let died = h.ledger.sweep_dead(t0.plus_secs(HORIZON_SECS + 1))?;
    assert_eq!(died, vec![txid]);
    assert_eq!(h.ledger.get_balance()?, Balance::default());
    let dead = &h.ledger.transactions()?[0];
    assert_eq!(dead.state, TxState::Dead);
    assert_eq!(dead.height, None);
    assert_balance_invariant(&h.ledger)?;

    let revived = h
        .ledger
        .observe_transaction_at(&raw, Some(101), t0.plus_secs(HORIZON_SECS + 2))?
        .ok_or_else(|| AgoraError::Persistence { reason: "untracked".into() })?;
    assert_eq!(revived.state, TxState::Confirmed);
    assert_eq!(revived.height, Some(101));
    assert_eq!(h.ledger.get_balance()?.confirmed, COIN);
    assert_balance_invariant(&h.ledger)
}

#[tokio::test]
async fn dead_spend_restores_its_inputs() -> Result<()> {
    let h = harness()?;
    fund(&h.ledger, COIN, Some(1))?;
    let spend = h.ledger.spend(30_000_000, &external_script(), FeeTier::Normal).await?;
    assert_eq!(h.ledger.get_balance()?.confirmed, 0);

    let died = h.ledger.sweep_dead(Timestamp::now().plus_secs(HORIZON_SECS + 60))?;
    assert_eq!(died, vec![spend.txid]);

    assert_eq!(
        h.ledger.get_balance()?,
        Balance {
            unconfirmed: COIN,
            confirmed: COIN
        }
    );
    assert!(h.ledger.coins()?.iter().all(|c| c.outpoint.txid != spend.txid));
    assert_balance_invariant(&h.ledger)
}

#[tokio::test]
async fn reorged_spend_dies_and_returns_its_inputs() -> Result<()> {
    let h = harness()?;
    let funding = fund(&h.ledger, COIN, Some(1))?;
    let spend = h.ledger.spend(30_000_000, &external_script(), FeeTier::Normal).await?;
    let raw = h.broadcaster.submitted().remove(0);
    let change_outpoint = OutPoint::new(spend.txid, 1);
    assert!(h.ledger.coins()?.iter().any(|c| c.outpoint == change_outpoint));

    let t0 = Timestamp::now();
    let confirmed = h
        .ledger
        .observe_transaction_at(&raw, Some(7), t0)?
        .ok_or_else(|| AgoraError::Persistence { reason: "untracked".into() })?;
    assert_eq!(confirmed.state, TxState::Confirmed);

    let reorged = h
        .ledger
        .observe_transaction_at(&raw, None, t0)?
        .ok_or_else(|| AgoraError::Persistence { reason: "untracked".into() })?;
    assert_eq!(reorged.state, TxState::Unconfirmed);
    assert_eq!(reorged.height, None);

    let died = h.ledger.sweep_dead(t0.plus_secs(HORIZON_SECS + 1))?;
    assert_eq!(died, vec![spend.txid]);

    let coins = h.ledger.coins()?;
    assert_eq!(coins.len(), 1);
    assert_eq!(coins[0].outpoint, OutPoint::new(funding, 0));
    assert_eq!(coins[0].value, COIN);
    assert!(coins.iter().all(|c| c.outpoint != change_outpoint));
    assert_eq!(
        h.ledger.get_balance()?,
        Balance {
            unconfirmed: COIN,
            confirmed: COIN
        }
    );
    assert_balance_invariant(&h.ledger)
}

#[test]
fn confirmed_transactions_never_die() -> Result<()> {
    let h = harness()?;
    let t0 = Timestamp::from_millis(1_700_000_000_000);
    fund_at(&h.ledger, COIN, Some(9), t0)?;
    assert!(h.ledger.sweep_dead(t0.plus_secs(HORIZON_SECS * 10))?.is_empty());
    assert_eq!(h.ledger.get_balance()?.confirmed, COIN);
    Ok(())
}

// ---------------------------------------------------------------------------
// Consistency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn violation_blocks_spends_until_reconciled() -> Result<()> {
    let h = harness()?;
    fund(&h.ledger, COIN, Some(1))?;

    let orphan = CoinRecord {
        outpoint: OutPoint::new(TxId::new([0x42; 32]), 0),
        value: 1_000,
        script_pubkey: external_script(),
    };
    h.repo.with(|store| store.coins()?.put(&orphan))?;

    assert!(matches!(h.ledger.reconcile(), Err(AgoraError::Consistency { .. })));
    assert!(h.ledger.is_read_only());
    let blocked = h.ledger.spend(COIN / 2, &external_script(), FeeTier::Normal).await;
    assert!(matches!(blocked, Err(AgoraError::Consistency { .. })));
    assert!(h.broadcaster.submitted().is_empty());

    // Reads still work.
    assert_eq!(h.ledger.get_balance()?.unconfirmed, COIN + 1_000);

    h.repo.with(|store| store.coins()?.remove(&orphan.outpoint))?;
    h.ledger.reconcile()?;
    assert!(!h.ledger.is_read_only());
    h.ledger.spend(COIN / 2, &external_script(), FeeTier::Normal).await?;
    Ok(())
}
