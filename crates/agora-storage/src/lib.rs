//! Persistent record store for the Agora node.
//!
//! One sled tree per table (`keyrecord`, `coinrecord`,
//! `transactionrecord`, `pointerrecord`, `mailboxentry`, `config`),
//! optionally sealed at rest with a passphrase. All access goes through
//! the [`Repository`] gateway, which serializes callers on one lock.

pub mod codec;
pub mod coins;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod keys;
pub mod mailbox;
pub mod pointers;
pub mod table;
pub mod transactions;

pub use coins::CoinRecord;
pub use engine::StorageEngine;
pub use gateway::Repository;
pub use keys::KeyRecord;
pub use mailbox::MailboxEntry;
pub use pointers::PointerRecord;
pub use transactions::TransactionRecord;
