//! Integration tests for the record store and its gateway.
//!
//! Timestamps are fixed via `Timestamp::from_millis()`; every test gets
//! its own store directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use agora_crypto::kdf::Argon2Params;
use agora_crypto::signing::Keypair;
use agora_storage::engine::{COINRECORD, TABLES};
use agora_storage::{CoinRecord, KeyRecord, MailboxEntry, PointerRecord, Repository, TransactionRecord};
use agora_types::{
    AgoraError, KeyPurpose, OutPoint, PayloadLocation, PointerId, PointerPurpose, RendezvousKey,
    Timestamp, TxId, TxState,
};
use zeroize::Zeroizing;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "agora-store-test-{}-{}-{}",
        std::process::id(),
        id,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    ))
}

fn open(path: &PathBuf, passphrase: &str) -> Result<Repository, AgoraError> {
    Repository::open_with_params(path, passphrase, Argon2Params::light())
}

fn key_record(purpose: KeyPurpose, index: u32) -> KeyRecord {
    let pk = Keypair::from_seed(&[index as u8 + purpose.as_u8() * 50; 32]).public_key();
    KeyRecord {
        public_key: pk,
        script_pubkey: pk.script(),
        purpose,
        used: false,
        index,
    }
}

fn coin(seed: u8, value: u64) -> CoinRecord {
    CoinRecord {
        outpoint: OutPoint::new(TxId::new([seed; 32]), 0),
        value,
        script_pubkey: "ab".repeat(32),
    }
}

fn tx_record(seed: u8) -> TransactionRecord {
    TransactionRecord {
        txid: TxId::new([seed; 32]),
        raw_tx: vec![seed; 40],
        height: None,
        state: TxState::Unconfirmed,
        timestamp: Timestamp::from_millis(1_700_000_000_000),
        value: 5_000,
        exchange_rate: Some(31_250.5),
        exchange_currency: "USD".into(),
        last_seen: Timestamp::from_millis(1_700_000_000_000),
    }
}

// ---------------------------------------------------------------------------
// Encryption at rest
// ---------------------------------------------------------------------------

#[test]
fn wrong_passphrase_is_encryption_error() -> Result<(), AgoraError> {
    let dir = temp_dir();
    {
        let repo = open(&dir, "correct horse")?;
        assert!(repo.is_encrypted()?);
        repo.flush()?;
    }
    let result = open(&dir, "battery staple");
    assert!(matches!(result, Err(AgoraError::Encryption { .. })));
    Ok(())
}

#[test]
fn encrypted_store_requires_passphrase() -> Result<(), AgoraError> {
    let dir = temp_dir();
    open(&dir, "secret")?.flush()?;
    assert!(matches!(open(&dir, ""), Err(AgoraError::Encryption { .. })));
    Ok(())
}

#[test]
fn plaintext_store_rejects_passphrase() -> Result<(), AgoraError> {
    let dir = temp_dir();
    {
        let repo = open(&dir, "")?;
        assert!(!repo.is_encrypted()?);
        repo.flush()?;
    }
    assert!(matches!(open(&dir, "secret"), Err(AgoraError::Encryption { .. })));
    Ok(())
}

#[test]
fn encrypted_rows_survive_reopen() -> Result<(), AgoraError> {
    let dir = temp_dir();
    {
        let repo = open(&dir, "pw")?;
        repo.with(|s| s.coins()?.put(&coin(1, 700)))?;
        repo.flush()?;
    }
    let repo = open(&dir, "pw")?;
    let coins = repo.with(|s| s.coins()?.list())?;
    assert_eq!(coins, vec![coin(1, 700)]);
    Ok(())
}

// ---------------------------------------------------------------------------
// Config table
// ---------------------------------------------------------------------------

#[test]
fn missing_mnemonic_is_not_initialized() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "")?;
    let result = repo.with(|s| s.config()?.get_mnemonic());
    assert!(matches!(result, Err(AgoraError::NotInitialized { .. })));
    Ok(())
}

#[test]
fn init_is_write_once() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "pw")?;
    repo.with(|s| s.config()?.init("word list", "00ff"))?;
    let phrase: Zeroizing<String> = repo.with(|s| s.config()?.get_mnemonic())?;
    assert_eq!(phrase.as_str(), "word list");
    assert_eq!(repo.with(|s| s.config()?.get_identity_key())?, "00ff");

    let again = repo.with(|s| s.config()?.init("other", "11"));
    assert!(matches!(again, Err(AgoraError::Validation { .. })));
    Ok(())
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[test]
fn first_unused_key_prefers_lowest_index() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "")?;
    repo.with(|s| {
        let keys = s.keys()?;
        keys.put(&key_record(KeyPurpose::Receive, 2))?;
        keys.put(&key_record(KeyPurpose::Receive, 0))?;
        keys.put(&key_record(KeyPurpose::Change, 0))?;
        Ok(())
    })?;

    let first = repo.with(|s| s.keys()?.first_unused(KeyPurpose::Receive))?;
    assert_eq!(first.map(|k| k.index), Some(0));

    let script = key_record(KeyPurpose::Receive, 0).script_pubkey;
    assert!(repo.with(|s| s.keys()?.mark_used(&script))?);
    let next = repo.with(|s| s.keys()?.first_unused(KeyPurpose::Receive))?;
    assert_eq!(next.map(|k| k.index), Some(2));

    assert_eq!(repo.with(|s| s.keys()?.next_index(KeyPurpose::Receive))?, 3);
    assert_eq!(repo.with(|s| s.keys()?.next_index(KeyPurpose::Escrow))?, 0);
    Ok(())
}

#[test]
fn mark_used_on_foreign_script_is_false() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "")?;
    assert!(!repo.with(|s| s.keys()?.mark_used(&"cd".repeat(32)))?);
    Ok(())
}

#[test]
fn mailbox_records_each_location_once() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "pw")?;
    let entry = MailboxEntry {
        payload_location: PayloadLocation::new("QmPayload")?,
        timestamp: Timestamp::from_millis(10),
    };
    assert!(repo.with(|s| s.mailbox()?.record(&entry))?);
    let later = MailboxEntry {
        timestamp: Timestamp::from_millis(99),
        ..entry.clone()
    };
    assert!(!repo.with(|s| s.mailbox()?.record(&later))?);
    let stored = repo.with(|s| s.mailbox()?.get(&entry.payload_location))?;
    assert_eq!(stored, Some(entry));
    Ok(())
}

#[test]
fn renewed_pointer_keeps_its_row() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "")?;
    let original = PointerRecord {
        pointer_id: PointerId::new([1; 32]),
        origin_id: PointerId::new([1; 32]),
        rendezvous_key: RendezvousKey::new([9; 32]),
        payload_location: PayloadLocation::new("QmA")?,
        purpose: PointerPurpose::Message,
        timestamp: Timestamp::from_millis(0),
        published: false,
    };
    repo.with(|s| s.pointers()?.put(&original))?;

    let renewed = PointerRecord {
        pointer_id: PointerId::new([2; 32]),
        timestamp: Timestamp::from_millis(5_000),
        published: true,
        ..original.clone()
    };
    repo.with(|s| s.pointers()?.put(&renewed))?;

    let all = repo.with(|s| s.pointers()?.list())?;
    assert_eq!(all, vec![renewed.clone()]);
    let by_origin = repo.with(|s| s.pointers()?.resolve(&original.pointer_id))?;
    assert_eq!(by_origin.as_ref(), Some(&renewed));
    let by_wire = repo.with(|s| s.pointers()?.resolve(&renewed.pointer_id))?;
    assert_eq!(by_wire, Some(renewed));
    assert_eq!(repo.with(|s| s.pointers()?.resolve(&PointerId::new([7; 32])))?, None);
    Ok(())
}

#[test]
fn transaction_height_agreement() {
    let mut record = tx_record(1);
    assert!(record.height_matches_state());
    record.state = TxState::Confirmed;
    assert!(!record.height_matches_state());
    record.height = Some(10);
    assert!(record.height_matches_state());
    record.state = TxState::Dead;
    assert!(!record.height_matches_state());
}

// ---------------------------------------------------------------------------
// Fingerprints and export
// ---------------------------------------------------------------------------

#[test]
fn reads_do_not_change_fingerprint() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "pw")?;
    repo.with(|s| s.coins()?.put(&coin(3, 1_000)))?;
    let before = repo.fingerprint(COINRECORD)?;
    let _ = repo.with(|s| s.coins()?.list())?;
    assert_eq!(before, repo.fingerprint(COINRECORD)?);

    repo.with(|s| s.coins()?.remove(&coin(3, 1_000).outpoint))?;
    assert_ne!(before, repo.fingerprint(COINRECORD)?);
    Ok(())
}

#[test]
fn export_encrypted_to_plaintext_round_trip() -> Result<(), AgoraError> {
    let src_dir = temp_dir();
    let dest_dir = temp_dir();
    {
        let repo = open(&src_dir, "source-pass")?;
        repo.with(|s| {
            s.config()?.init("alpha beta", "abcd")?;
            s.keys()?.put(&key_record(KeyPurpose::Receive, 0))?;
            s.coins()?.put(&coin(4, 2_500))?;
            s.transactions()?.put(&tx_record(4))?;
            Ok(())
        })?;
        let copied = repo.export(&dest_dir, "")?;
        // config: 2, keys: 2 (record + script index), coin, tx.
        assert_eq!(copied, 6);
    }

    let copy = open(&dest_dir, "")?;
    assert!(!copy.is_encrypted()?);
    assert_eq!(copy.with(|s| s.config()?.get_mnemonic())?.as_str(), "alpha beta");
    assert_eq!(copy.with(|s| s.coins()?.list())?, vec![coin(4, 2_500)]);
    assert_eq!(copy.with(|s| s.transactions()?.get(&TxId::new([4; 32])))?, Some(tx_record(4)));
    let key = key_record(KeyPurpose::Receive, 0);
    assert_eq!(copy.with(|s| s.keys()?.get_by_script(&key.script_pubkey))?, Some(key));
    Ok(())
}

#[test]
fn export_to_plaintext_twice_is_byte_identical() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "pw")?;
    repo.with(|s| s.coins()?.put(&coin(5, 10)))?;

    let a = temp_dir();
    let b = temp_dir();
    repo.export(&a, "")?;
    repo.export(&b, "")?;

    let fa = open(&a, "")?.fingerprints()?;
    let fb = open(&b, "")?.fingerprints()?;
    assert_eq!(fa, fb);
    assert_eq!(fa.len(), TABLES.len());
    Ok(())
}

#[test]
fn export_into_foreign_encrypted_store_fails() -> Result<(), AgoraError> {
    let repo = open(&temp_dir(), "")?;
    let dest = temp_dir();
    open(&dest, "someone-else")?.flush()?;

    let result = repo.export(&dest, "not-their-pass");
    assert!(matches!(result, Err(AgoraError::Export { .. })));
    Ok(())
}

#[test]
fn export_onto_live_store_is_refused_however_spelled() -> Result<(), AgoraError> {
    let dir = temp_dir();
    let repo = open(&dir, "")?;
    repo.with(|s| s.coins()?.put(&coin(6, 900)))?;
    let name = dir
        .file_name()
        .ok_or_else(|| AgoraError::Persistence { reason: "temp dir has no name".into() })?;

    let dotted = dir.join("..").join(name);
    assert!(matches!(repo.export(&dotted, ""), Err(AgoraError::Export { .. })));
    assert!(matches!(repo.export(&dir.join("."), ""), Err(AgoraError::Export { .. })));

    assert_eq!(repo.with(|s| s.coins()?.list())?, vec![coin(6, 900)]);
    Ok(())
}
