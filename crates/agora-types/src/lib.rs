//! Core shared types for the Agora commerce node.
//!
//! Identifiers, enumerations, timestamps and the central error type used
//! by every crate in the workspace. Storage, wallet and mailbox crates
//! never define their own shared types; they live here.

pub mod config;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// 32-byte identifiers
// ---------------------------------------------------------------------------

/// Declares a fixed 32-byte identifier with hex `Display` / `FromStr`.
macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// The fixed byte length of this identifier.
            pub const LEN: usize = 32;

            /// Creates the identifier from raw bytes.
            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Returns the underlying bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = AgoraError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|_| AgoraError::Validation {
                    reason: format!("invalid hex encoding for {}", $what),
                })?;
                if bytes.len() != 32 {
                    return Err(AgoraError::Validation {
                        reason: format!("expected 32 bytes for {}, got {}", $what, bytes.len()),
                    });
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }
        }
    };
}

hex_id!(
    /// Identity of a peer in the commerce network (hash of its identity key).
    ///
    /// Rendezvous keys are derived from the recipient's `NodeId`, so any
    /// party knowing the id can compute where pointers for it live.
    NodeId,
    "node id"
);

hex_id!(
    /// Transaction identifier: double SHA-256 of the unsigned transaction.
    TxId,
    "txid"
);

hex_id!(
    /// Key under which pointers are published in the lookup service.
    RendezvousKey,
    "rendezvous key"
);

hex_id!(
    /// Random identifier of a single pointer publication.
    ///
    /// Republishing the same payload issues a fresh `PointerId`.
    PointerId,
    "pointer id"
);

// ---------------------------------------------------------------------------
// OutPoint
// ---------------------------------------------------------------------------

/// Reference to a single transaction output: `txid:index`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Transaction that created the output.
    pub txid: TxId,
    /// Output position within that transaction.
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

impl FromStr for OutPoint {
    type Err = AgoraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (txid, index) = s.split_once(':').ok_or_else(|| AgoraError::Validation {
            reason: format!("outpoint '{s}' is missing ':' separator"),
        })?;
        let index = index.parse::<u32>().map_err(|e| AgoraError::Validation {
            reason: format!("invalid outpoint index '{index}': {e}"),
        })?;
        Ok(Self {
            txid: txid.parse()?,
            index,
        })
    }
}

// ---------------------------------------------------------------------------
// PayloadLocation
// ---------------------------------------------------------------------------

/// Content address of a payload held by the content-addressed store.
///
/// Opaque to this crate apart from basic well-formedness: non-empty,
/// at most [`PayloadLocation::MAX_LEN`] bytes, no whitespace.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PayloadLocation(String);

impl PayloadLocation {
    /// Maximum accepted length of a location string.
    pub const MAX_LEN: usize = 512;

    /// Validates and wraps a location string.
    pub fn new(location: impl Into<String>) -> Result<Self> {
        let location = location.into();
        if location.is_empty() {
            return Err(AgoraError::Validation {
                reason: "payload location must not be empty".into(),
            });
        }
        if location.len() > Self::MAX_LEN {
            return Err(AgoraError::Validation {
                reason: format!(
                    "payload location exceeds {} bytes ({})",
                    Self::MAX_LEN,
                    location.len()
                ),
            });
        }
        if location.chars().any(char::is_whitespace) {
            return Err(AgoraError::Validation {
                reason: "payload location must not contain whitespace".into(),
            });
        }
        Ok(Self(location))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PayloadLocation {
    type Err = AgoraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// UTC timestamp with millisecond resolution.
///
/// Persisted records and wire payloads carry milliseconds since the Unix
/// epoch; the wrapper keeps arithmetic in one place.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` representing the current UTC time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Builds a timestamp from milliseconds since the Unix epoch.
    ///
    /// Out-of-range values clamp to the epoch.
    pub fn from_millis(millis: i64) -> Self {
        let dt = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default();
        Self(dt)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Milliseconds since the Unix epoch.
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Milliseconds elapsed from `earlier` to `self` (negative if `earlier`
    /// is in the future).
    pub fn millis_since(&self, earlier: &Timestamp) -> i64 {
        self.as_millis().saturating_sub(earlier.as_millis())
    }

    /// Returns this timestamp shifted by `secs` seconds.
    pub fn plus_secs(&self, secs: u64) -> Self {
        let delta = i64::try_from(secs).unwrap_or(i64::MAX / 1000);
        Self::from_millis(self.as_millis().saturating_add(delta.saturating_mul(1000)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Role of a derived wallet key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyPurpose {
    /// Handed out to counterparties to receive funds.
    Receive,
    /// Receives the residual of an outgoing spend.
    Change,
    /// Participates in escrowed order funding.
    Escrow,
}

impl KeyPurpose {
    pub const ALL: [KeyPurpose; 3] = [Self::Receive, Self::Change, Self::Escrow];

    /// Persisted integer code.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Receive => 0,
            Self::Change => 1,
            Self::Escrow => 2,
        }
    }

    pub fn from_u8(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Receive),
            1 => Ok(Self::Change),
            2 => Ok(Self::Escrow),
            other => Err(AgoraError::Validation {
                reason: format!("unknown key purpose code {other}"),
            }),
        }
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receive => write!(f, "receive"),
            Self::Change => write!(f, "change"),
            Self::Escrow => write!(f, "escrow"),
        }
    }
}

/// Purpose tag of a rendezvous pointer.
///
/// Each purpose has its own rendezvous key for a given recipient, and its
/// own handler on the receiving side.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointerPurpose {
    /// Offline protocol message (order notices, escrow releases).
    Message,
    /// Moderator announcement.
    Moderator,
    /// Public-key exchange.
    PublicKey,
}

impl PointerPurpose {
    pub const ALL: [PointerPurpose; 3] = [Self::Message, Self::Moderator, Self::PublicKey];

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Message => 1,
            Self::Moderator => 2,
            Self::PublicKey => 3,
        }
    }

    pub fn from_u8(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Message),
            2 => Ok(Self::Moderator),
            3 => Ok(Self::PublicKey),
            other => Err(AgoraError::Validation {
                reason: format!("unknown pointer purpose code {other}"),
            }),
        }
    }
}

impl fmt::Display for PointerPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Moderator => write!(f, "moderator"),
            Self::PublicKey => write!(f, "public_key"),
        }
    }
}

impl FromStr for PointerPurpose {
    type Err = AgoraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "message" => Ok(Self::Message),
            "moderator" => Ok(Self::Moderator),
            "public_key" | "publickey" => Ok(Self::PublicKey),
            other => Err(AgoraError::Validation {
                reason: format!("unknown pointer purpose '{other}'"),
            }),
        }
    }
}

/// Confirmation state of a wallet transaction.
///
/// ```text
/// Unconfirmed ──height──▶ Confirmed ──reorg──▶ Unconfirmed
///      │                                            │
///      └──────── unseen past dead horizon ──────────┴──▶ Dead
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TxState {
    Unconfirmed,
    Confirmed,
    Dead,
}

impl TxState {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Unconfirmed => 0,
            Self::Confirmed => 1,
            Self::Dead => 2,
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfirmed => write!(f, "unconfirmed"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

/// Named fee class mapped to an externally estimated fee rate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FeeTier {
    Priority,
    Normal,
    Economic,
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Priority => write!(f, "PRIORITY"),
            Self::Normal => write!(f, "NORMAL"),
            Self::Economic => write!(f, "ECONOMIC"),
        }
    }
}

impl FromStr for FeeTier {
    type Err = AgoraError;

    /// Case-insensitive: `"economic"`, `"Economic"` and `"ECONOMIC"` all parse.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRIORITY" => Ok(Self::Priority),
            "NORMAL" => Ok(Self::Normal),
            "ECONOMIC" => Ok(Self::Economic),
            other => Err(AgoraError::Validation {
                reason: format!("unknown fee tier '{other}'"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// AgoraError
// ---------------------------------------------------------------------------

/// Central error type for the Agora node.
///
/// All crates convert their internal failures into one of these variants.
#[derive(Debug, Error)]
pub enum AgoraError {
    /// Malformed caller input, rejected before touching storage.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// Coin selection cannot cover amount plus fee.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// Storage read/write failure.
    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    /// Transient network failure (fetch, put, broadcast, timeout).
    #[error("network error: {reason}")]
    Network { reason: String },

    /// The lookup service rejected a pointer publication.
    #[error("publish error: {reason}")]
    Publish { reason: String },

    /// A ledger invariant was violated; the ledger is read-only until
    /// reconciled.
    #[error("consistency error: {reason}")]
    Consistency { reason: String },

    /// Wrong passphrase or tampered record.
    #[error("encryption error: {reason}")]
    Encryption { reason: String },

    /// The wallet seed has not been written yet.
    #[error("not initialized: {reason}")]
    NotInitialized { reason: String },

    /// Copying the store to a destination failed.
    #[error("export error: {reason}")]
    Export { reason: String },

    /// Cryptographic primitive failure (signing, derivation, AEAD).
    #[error("crypto error: {reason}")]
    Crypto { reason: String },

    /// Invalid or missing configuration value.
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl AgoraError {
    /// `true` for failures that a scheduler should retry on its next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Publish { .. })
    }
}

/// Convenience result type using [`AgoraError`].
pub type Result<T> = std::result::Result<T, AgoraError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
