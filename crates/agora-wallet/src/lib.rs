//! Agora wallet: hierarchical keys, coin tracking, spends and the
//! confirmation lifecycle of wallet transactions.
//!
//! Everything persistent goes through [`agora_storage::Repository`]; the
//! network sits behind the [`chain::Broadcaster`],
//! [`fees::FeeEstimator`] and [`chain::ExchangeRates`] traits.

pub mod builder;
pub mod chain;
pub mod confirm;
pub mod fees;
pub mod keychain;
pub mod ledger;
pub mod model;
pub mod selection;

pub use chain::{Broadcaster, ChainEvent, ExchangeRates};
pub use fees::{FeeEstimator, StaticFeeEstimator};
pub use keychain::{KeySource, MnemonicKeySource};
pub use ledger::{Balance, LedgerConfig, WalletLedger};
pub use model::{TxInput, TxOutput, WalletTx};
