//! Single-writer gateway over the record store.
//!
//! Every read and write goes through [`Repository::with`], which holds
//! one exclusive lock for the duration of a synchronous closure. A
//! logical operation that touches several tables does so inside one
//! closure, so no other caller observes it half-applied. The closure is
//! not `async`, so the lock cannot be held across an `.await`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use agora_crypto::kdf::Argon2Params;
use agora_types::{AgoraError, Result};

use crate::engine::{StorageEngine, TABLES};

pub struct Repository {
    engine: Mutex<StorageEngine>,
    path: PathBuf,
    params: Argon2Params,
}

impl Repository {
    /// Opens the store at `path` with Argon2id default costs.
    pub fn open(path: &Path, passphrase: &str) -> Result<Self> {
        Self::open_with_params(path, passphrase, Argon2Params::default())
    }

    pub fn open_with_params(path: &Path, passphrase: &str, params: Argon2Params) -> Result<Self> {
        let engine = StorageEngine::open(path, passphrase, &params)?;
        Ok(Self {
            engine: Mutex::new(engine),
            path: path.to_path_buf(),
            params,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` with exclusive access to every table.
    pub fn with<R>(&self, f: impl FnOnce(&StorageEngine) -> Result<R>) -> Result<R> {
        let engine = self.lock()?;
        f(&engine)
    }

    pub fn is_encrypted(&self) -> Result<bool> {
        self.with(|engine| Ok(engine.is_encrypted()))
    }

    pub fn flush(&self) -> Result<()> {
        self.with(StorageEngine::flush)
    }

    /// Fingerprint of one table; see [`StorageEngine::fingerprint`].
    pub fn fingerprint(&self, table: &str) -> Result<[u8; 32]> {
        self.with(|engine| engine.fingerprint(table))
    }

    /// Fingerprints of every data table, in [`TABLES`] order.
    pub fn fingerprints(&self) -> Result<Vec<(&'static str, [u8; 32])>> {
        self.with(|engine| {
            TABLES
                .iter()
                .map(|name| Ok((*name, engine.fingerprint(name)?)))
                .collect()
        })
    }

    /// Copies the whole store to `destination` under the gateway lock.
    ///
    /// The destination is created if absent and sealed with
    /// `passphrase` (empty for plaintext). On failure the partially
    /// written destination is left for the caller to discard.
    ///
    /// # Errors
    ///
    /// [`AgoraError::Export`] wrapping the underlying failure.
    pub fn export(&self, destination: &Path, passphrase: &str) -> Result<usize> {
        if resolve(destination) == resolve(&self.path) {
            return Err(AgoraError::Export {
                reason: "destination is the live store".into(),
            });
        }
        let engine = self.lock()?;
        let copied = copy_store(&engine, destination, passphrase, &self.params).map_err(|e| {
            tracing::warn!(destination = %destination.display(), error = %e, "export failed");
            match e {
                AgoraError::Export { .. } => e,
                other => AgoraError::Export {
                    reason: other.to_string(),
                },
            }
        })?;
        tracing::info!(destination = %destination.display(), rows = copied, "store exported");
        Ok(copied)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StorageEngine>> {
        self.engine.lock().map_err(|_| AgoraError::Persistence {
            reason: "repository lock poisoned".into(),
        })
    }
}

/// `path` with symlinks and `..` resolved. A path that does not exist yet
/// is resolved through its parent.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

fn copy_store(src: &StorageEngine, destination: &Path, passphrase: &str, params: &Argon2Params) -> Result<usize> {
    let dest = StorageEngine::open(destination, passphrase, params)?;
    let copied = src.copy_into(&dest)?;
    dest.flush()?;
    Ok(copied)
}
