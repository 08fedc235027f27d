//! Database lifecycle and key management.
//!
//! [`StorageEngine`] owns the sled database and the record codec. On
//! [`open`](StorageEngine::open) it reads (or writes, for a new store)
//! the meta tree, derives the store keys from the passphrase and checks
//! them against the stored verifier, so a wrong passphrase fails before
//! any table is read.

use std::path::Path;

use agora_crypto::hash::Sha3Hasher;
use agora_crypto::hkdf::split_store_keys;
use agora_crypto::kdf::{argon2id_derive_key, Argon2Params};
use agora_types::{AgoraError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::codec::RecordCodec;
use crate::coins::CoinStore;
use crate::config::ConfigStore;
use crate::keys::KeyStore;
use crate::mailbox::MailboxStore;
use crate::pointers::PointerStore;
use crate::transactions::TransactionStore;

// ---------------------------------------------------------------------------
// Tree names
// ---------------------------------------------------------------------------

pub const KEYRECORD: &str = "keyrecord";
pub const KEYRECORD_BY_SCRIPT: &str = "keyrecord_by_script";
pub const COINRECORD: &str = "coinrecord";
pub const TRANSACTIONRECORD: &str = "transactionrecord";
pub const POINTERRECORD: &str = "pointerrecord";
pub const MAILBOXENTRY: &str = "mailboxentry";
pub const CONFIG: &str = "config";

/// Every data tree, in export order.
pub const TABLES: [&str; 7] = [
    KEYRECORD,
    KEYRECORD_BY_SCRIPT,
    COINRECORD,
    TRANSACTIONRECORD,
    POINTERRECORD,
    MAILBOXENTRY,
    CONFIG,
];

/// Store metadata: salt, mode and verifier. Never exported.
const META: &str = "__agora_meta";
const META_MODE: &[u8] = b"mode";
const META_SALT: &[u8] = b"salt";
const META_VERIFIER: &[u8] = b"verifier";

const MODE_PLAIN: &[u8] = b"plain";
const MODE_SEALED: &[u8] = b"sealed";
const VERIFIER_PLAINTEXT: &[u8] = b"agora-store-verifier-v1";
const SALT_LEN: usize = 16;

pub struct StorageEngine {
    db: sled::Db,
    codec: RecordCodec,
}

impl StorageEngine {
    /// Opens (or creates) the store at `path`.
    ///
    /// An empty `passphrase` means a plaintext store.
    ///
    /// # Errors
    ///
    /// - [`AgoraError::Encryption`] on a wrong passphrase, or when the
    ///   passphrase presence does not match how the store was created.
    /// - [`AgoraError::Persistence`] if sled cannot open the directory.
    pub fn open(path: &Path, passphrase: &str, params: &Argon2Params) -> Result<Self> {
        let db = sled::open(path).map_err(|e| AgoraError::Persistence {
            reason: format!("failed to open store at {}: {e}", path.display()),
        })?;
        let meta = open_tree(&db, META)?;

        let codec = match meta.get(META_MODE).map_err(meta_err)? {
            None => initialize_meta(&meta, passphrase, params)?,
            Some(mode) => unlock(&meta, &mode, passphrase, params)?,
        };

        for name in TABLES {
            open_tree(&db, name)?;
        }
        meta.flush().map_err(meta_err)?;

        tracing::debug!(
            path = %path.display(),
            encrypted = codec.is_encrypted(),
            "record store opened"
        );
        Ok(Self { db, codec })
    }

    pub fn is_encrypted(&self) -> bool {
        self.codec.is_encrypted()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| AgoraError::Persistence {
            reason: format!("failed to flush store: {e}"),
        })?;
        Ok(())
    }

    pub(crate) fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    pub(crate) fn tree(&self, name: &str) -> Result<sled::Tree> {
        open_tree(&self.db, name)
    }

    /// SHA3-256 over every raw `(key, sealed value)` row of `table`.
    ///
    /// Equal fingerprints mean byte-identical tables.
    pub fn fingerprint(&self, table: &str) -> Result<[u8; 32]> {
        let mut hasher = Sha3Hasher::new();
        for item in self.tree(table)?.iter() {
            let (key, value) = item.map_err(|e| AgoraError::Persistence {
                reason: format!("{table} scan failed: {e}"),
            })?;
            hasher.update_framed(&key);
            hasher.update_framed(&value);
        }
        Ok(hasher.finalize())
    }

    /// Copies every row of every data tree into `dest`, re-sealing each
    /// value with the destination's codec.
    pub(crate) fn copy_into(&self, dest: &StorageEngine) -> Result<usize> {
        let mut copied = 0usize;
        for name in self.db.tree_names() {
            let name = String::from_utf8_lossy(&name).into_owned();
            if name == META || name.starts_with("__sled__") {
                continue;
            }
            let src = self.tree(&name)?;
            let dst = dest.tree(&name)?;
            for item in src.iter() {
                let (key, raw) = item.map_err(|e| AgoraError::Persistence {
                    reason: format!("{name} scan failed: {e}"),
                })?;
                let plain = self.codec.open(&name, &raw)?;
                let resealed = dest.codec.seal(&name, &plain)?;
                dst.insert(key, resealed).map_err(|e| AgoraError::Persistence {
                    reason: format!("{name} insert failed: {e}"),
                })?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    pub fn keys(&self) -> Result<KeyStore<'_>> {
        KeyStore::new(self)
    }

    pub fn coins(&self) -> Result<CoinStore<'_>> {
        CoinStore::new(self)
    }

    pub fn transactions(&self) -> Result<TransactionStore<'_>> {
        TransactionStore::new(self)
    }

    pub fn pointers(&self) -> Result<PointerStore<'_>> {
        PointerStore::new(self)
    }

    pub fn mailbox(&self) -> Result<MailboxStore<'_>> {
        MailboxStore::new(self)
    }

    pub fn config(&self) -> Result<ConfigStore<'_>> {
        ConfigStore::new(self)
    }
}

// ---------------------------------------------------------------------------
// Meta tree
// ---------------------------------------------------------------------------

fn initialize_meta(meta: &sled::Tree, passphrase: &str, params: &Argon2Params) -> Result<RecordCodec> {
    if passphrase.is_empty() {
        meta.insert(META_MODE, MODE_PLAIN).map_err(meta_err)?;
        return Ok(RecordCodec::Plaintext);
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let codec = sealed_codec(passphrase, &salt, params)?;
    let verifier = codec.seal(META, VERIFIER_PLAINTEXT)?;

    meta.insert(META_SALT, &salt[..]).map_err(meta_err)?;
    meta.insert(META_VERIFIER, verifier).map_err(meta_err)?;
    meta.insert(META_MODE, MODE_SEALED).map_err(meta_err)?;
    Ok(codec)
}

fn unlock(meta: &sled::Tree, mode: &[u8], passphrase: &str, params: &Argon2Params) -> Result<RecordCodec> {
    match (mode, passphrase.is_empty()) {
        (MODE_PLAIN, true) => Ok(RecordCodec::Plaintext),
        (MODE_PLAIN, false) => Err(AgoraError::Encryption {
            reason: "store is not encrypted but a passphrase was given".into(),
        }),
        (MODE_SEALED, true) => Err(AgoraError::Encryption {
            reason: "store is encrypted; a passphrase is required".into(),
        }),
        (MODE_SEALED, false) => {
            let salt = meta.get(META_SALT).map_err(meta_err)?.ok_or_else(|| missing("salt"))?;
            let verifier = meta
                .get(META_VERIFIER)
                .map_err(meta_err)?
                .ok_or_else(|| missing("verifier"))?;

            let codec = sealed_codec(passphrase, &salt, params)?;
            let opened = codec.open(META, &verifier).map_err(|_| AgoraError::Encryption {
                reason: "wrong passphrase".into(),
            })?;
            if opened != VERIFIER_PLAINTEXT {
                return Err(AgoraError::Encryption {
                    reason: "wrong passphrase".into(),
                });
            }
            Ok(codec)
        }
        _ => Err(AgoraError::Persistence {
            reason: "store meta has an unknown mode".into(),
        }),
    }
}

fn sealed_codec(passphrase: &str, salt: &[u8], params: &Argon2Params) -> Result<RecordCodec> {
    let master = argon2id_derive_key(passphrase.as_bytes(), salt, params)?;
    Ok(RecordCodec::Sealed(split_store_keys(master.as_bytes(), salt)?))
}

fn open_tree(db: &sled::Db, name: &str) -> Result<sled::Tree> {
    db.open_tree(name).map_err(|e| AgoraError::Persistence {
        reason: format!("failed to open tree '{name}': {e}"),
    })
}

fn meta_err(e: sled::Error) -> AgoraError {
    AgoraError::Persistence {
        reason: format!("store meta access failed: {e}"),
    }
}

fn missing(what: &str) -> AgoraError {
    AgoraError::Persistence {
        reason: format!("encrypted store is missing its {what}"),
    }
}
