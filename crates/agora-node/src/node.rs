//! Node lifecycle and caller-facing operations.
//!
//! The [`Node`] owns one ledger, one pointer directory and one mailbox,
//! all sharing a single [`Repository`]. After [`Node::start`] three
//! background tasks run until [`Node::shutdown`]:
//!
//! - pointer republish scheduler
//! - mailbox poller
//! - chain-observation consumer with the dead sweep
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ Stopped
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agora_crypto::hash::sha3_256;
use agora_crypto::hd_derive::derive_identity_key;
use agora_crypto::mnemonic::Mnemonic;
use agora_mailbox::poller::run_poller;
use agora_mailbox::republish::run_republisher;
use agora_mailbox::transport::with_deadline;
use agora_mailbox::{
    ContentStore, DirectoryConfig, HandlerRegistry, LookupService, MemoryContentStore, MemoryLookup, MessageMailbox,
    PointerDirectory, Schedule,
};
use agora_storage::{KeyRecord, PointerRecord, Repository, TransactionRecord};
use agora_types::config::AppConfig;
use agora_types::{AgoraError, FeeTier, NodeId, PointerId, PointerPurpose, Result};
use agora_wallet::{
    Balance, Broadcaster, ChainEvent, ExchangeRates, FeeEstimator, LedgerConfig, MnemonicKeySource,
    StaticFeeEstimator, WalletLedger,
};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::chain_consumer::run_chain_consumer;

/// Capacity of the in-process chain feed used by [`Services::in_memory`].
const CHAIN_CHANNEL_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    Initializing,
    Running,
    Stopped,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// External services
// ---------------------------------------------------------------------------

/// The external collaborators a node is wired to.
pub struct Services {
    pub lookup: Arc<dyn LookupService>,
    pub content: Arc<dyn ContentStore>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub fees: Arc<dyn FeeEstimator>,
    pub rates: Option<Arc<dyn ExchangeRates>>,
    pub handlers: HandlerRegistry,
}

impl Services {
    /// In-process lookup and content services, a static fee table and a
    /// broadcaster that loops submitted transactions back into the
    /// returned chain feed as unconfirmed observations.
    pub fn in_memory() -> (Self, mpsc::Sender<ChainEvent>, mpsc::Receiver<ChainEvent>) {
        let (chain_tx, chain_rx) = mpsc::channel(CHAIN_CHANNEL_SIZE);
        let services = Self {
            lookup: Arc::new(MemoryLookup::new()),
            content: Arc::new(MemoryContentStore::new()),
            broadcaster: Arc::new(LoopbackBroadcaster {
                feed: chain_tx.clone(),
            }),
            fees: Arc::new(StaticFeeEstimator::default()),
            rates: None,
            handlers: HandlerRegistry::new(),
        };
        (services, chain_tx, chain_rx)
    }
}

/// Feeds every submitted transaction back as a mempool observation.
pub struct LoopbackBroadcaster {
    feed: mpsc::Sender<ChainEvent>,
}

#[async_trait]
impl Broadcaster for LoopbackBroadcaster {
    async fn submit(&self, raw_tx: &[u8]) -> Result<()> {
        self.feed
            .send(ChainEvent {
                raw_tx: raw_tx.to_vec(),
                height: None,
            })
            .await
            .map_err(|_| AgoraError::Network {
                reason: "chain feed closed".into(),
            })
    }
}

// ---------------------------------------------------------------------------
// Wallet initialization
// ---------------------------------------------------------------------------

/// Writes a wallet seed (generated when `phrase` is `None`) and the
/// identity key derived from it into an empty store.
///
/// # Errors
///
/// - [`AgoraError::Validation`] for an invalid phrase or an already
///   initialized store.
pub fn initialize_wallet(repo: &Repository, phrase: Option<&str>) -> Result<Mnemonic> {
    let mnemonic = match phrase {
        Some(p) => Mnemonic::parse(p)?,
        None => Mnemonic::generate()?,
    };
    let identity = derive_identity_key(&mnemonic.to_seed()?)?;
    let identity_hex = hex::encode(identity.secret_bytes());
    repo.with(|store| store.config()?.init(mnemonic.as_str(), &identity_hex))?;
    tracing::info!(words = mnemonic.word_count(), "wallet initialized");
    Ok(mnemonic)
}

/// Node id of the store's identity key: SHA3-256 of its public key.
pub fn load_node_id(repo: &Repository) -> Result<NodeId> {
    let identity_hex = repo.with(|store| store.config()?.get_identity_key())?;
    let bytes = hex::decode(&identity_hex).map_err(|e| AgoraError::Persistence {
        reason: format!("stored identity key is not hex: {e}"),
    })?;
    let secret: [u8; 32] = bytes.try_into().map_err(|_| AgoraError::Persistence {
        reason: "stored identity key has wrong length".into(),
    })?;
    let public = agora_crypto::signing::Keypair::from_seed(&secret).public_key();
    Ok(NodeId::new(sha3_256(public.as_bytes())))
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

pub struct Node {
    state: NodeState,
    config: AppConfig,
    node_id: NodeId,
    repo: Arc<Repository>,
    ledger: Arc<WalletLedger>,
    directory: Arc<PointerDirectory>,
    mailbox: Arc<MessageMailbox>,
    content: Arc<dyn ContentStore>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Wires a node over an initialized store.
    ///
    /// # Errors
    ///
    /// - [`AgoraError::Config`] for an invalid configuration.
    /// - [`AgoraError::NotInitialized`] when the store holds no seed.
    pub fn new(repo: Arc<Repository>, config: AppConfig, services: Services) -> Result<Self> {
        config.validate()?;

        let phrase = repo.with(|store| store.config()?.get_mnemonic())?;
        let keys = Arc::new(MnemonicKeySource::from_phrase(&phrase)?);
        let node_id = load_node_id(&repo)?;

        let mut ledger = WalletLedger::new(
            repo.clone(),
            keys,
            services.fees,
            services.broadcaster,
            LedgerConfig::from_app(&config),
        );
        if let Some(rates) = services.rates {
            ledger = ledger.with_rates(rates);
        }

        let directory = PointerDirectory::new(
            repo.clone(),
            services.lookup,
            node_id,
            DirectoryConfig::from_app(&config),
        );
        let mailbox = MessageMailbox::new(
            repo.clone(),
            services.content.clone(),
            services.handlers,
            Duration::from_secs(config.network_timeout_secs),
        );
        let (shutdown_tx, _) = watch::channel(false);

        tracing::info!(%node_id, encrypted = repo.is_encrypted()?, "node created");
        Ok(Self {
            state: NodeState::Initializing,
            config,
            node_id,
            repo,
            ledger: Arc::new(ledger),
            directory: Arc::new(directory),
            mailbox: Arc::new(mailbox),
            content: services.content,
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    /// Spawns the background tasks. `chain_events` is the observation feed.
    ///
    /// # Errors
    ///
    /// [`AgoraError::Config`] unless the node is `Initializing`.
    pub fn start(&mut self, chain_events: mpsc::Receiver<ChainEvent>) -> Result<()> {
        if self.state != NodeState::Initializing {
            return Err(AgoraError::Config {
                reason: format!("cannot start node in state '{}'", self.state),
            });
        }

        if let Err(e) = self.ledger.reconcile() {
            tracing::error!(error = %e, "ledger inconsistent at startup, spends disabled");
        }

        let republish = Schedule::new(Duration::from_secs(self.config.republish_interval_secs), &self.config);
        let poll = Schedule::new(Duration::from_secs(self.config.mailbox_poll_interval_secs), &self.config);

        self.tasks.push(tokio::spawn(run_republisher(
            self.directory.clone(),
            republish,
            self.shutdown_tx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(run_poller(
            self.directory.clone(),
            self.mailbox.clone(),
            poll,
            self.shutdown_tx.subscribe(),
        )));
        self.tasks.push(tokio::spawn(run_chain_consumer(
            self.ledger.clone(),
            chain_events,
            Duration::from_secs(self.config.dead_sweep_interval_secs),
            self.shutdown_tx.subscribe(),
        )));

        self.state = NodeState::Running;
        tracing::info!(node_id = %self.node_id, "node started");
        Ok(())
    }

    /// Signals every task, waits for them and flushes the store.
    /// Idempotent.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == NodeState::Stopped {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "background task panicked");
            }
        }
        self.repo.flush()?;
        self.state = NodeState::Stopped;
        tracing::info!("node stopped");
        Ok(())
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn ledger(&self) -> &Arc<WalletLedger> {
        &self.ledger
    }

    pub fn directory(&self) -> &Arc<PointerDirectory> {
        &self.directory
    }

    pub fn mailbox(&self) -> &Arc<MessageMailbox> {
        &self.mailbox
    }

    // -- Wallet --------------------------------------------------------------

    pub fn get_balance(&self) -> Result<Balance> {
        self.ledger.get_balance()
    }

    pub fn next_receive_address(&self) -> Result<KeyRecord> {
        self.ledger.next_receive_address()
    }

    pub async fn spend(&self, amount: u64, destination: &str, tier: FeeTier) -> Result<TransactionRecord> {
        self.ledger.spend(amount, destination, tier).await
    }

    pub fn transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.ledger.transactions()
    }

    pub fn reconcile(&self) -> Result<()> {
        self.ledger.reconcile()
    }

    /// # Errors
    ///
    /// [`AgoraError::NotInitialized`] when the store holds no seed.
    pub fn get_mnemonic(&self) -> Result<Zeroizing<String>> {
        self.repo.with(|store| store.config()?.get_mnemonic())
    }

    pub fn export(&self, destination: &Path, passphrase: &str) -> Result<usize> {
        self.repo.export(destination, passphrase)
    }

    // -- Messaging -----------------------------------------------------------

    /// Stores `payload` and publishes a pointer to it for `recipient`.
    ///
    /// A transient publish failure is not an error: the record comes back
    /// with `published == false` and the republish scheduler retries it.
    pub async fn publish_message(
        &self,
        purpose: PointerPurpose,
        recipient: &NodeId,
        payload: &[u8],
    ) -> Result<PointerRecord> {
        let timeout = Duration::from_secs(self.config.network_timeout_secs);
        let location = with_deadline(timeout, "payload store", self.content.store(payload)).await?;
        let record = self
            .directory
            .record_pointer(purpose, recipient, location, agora_types::Timestamp::now())?;

        match self.directory.announce(record.clone()).await {
            Ok(published) => Ok(published),
            Err(e) if e.is_transient() => {
                tracing::warn!(pointer_id = %record.pointer_id, error = %e, "publish deferred to republish scheduler");
                Ok(record)
            }
            Err(e) => Err(e),
        }
    }

    pub fn mark_delivered(&self, pointer_id: &PointerId) -> Result<bool> {
        self.directory.mark_delivered(pointer_id)
    }

    pub fn cancel_pointer(&self, pointer_id: &PointerId) -> Result<bool> {
        self.directory.cancel(pointer_id)
    }
}
