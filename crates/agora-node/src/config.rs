//! CLI argument parsing and config file support.
//!
//! The node can be configured via CLI flags, a JSON config file,
//! or a combination of both (CLI overrides config file).

use std::path::{Path, PathBuf};

use agora_types::config::AppConfig;
use agora_types::{AgoraError, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// Environment variable consulted when `--passphrase` is absent.
pub const PASSPHRASE_ENV: &str = "AGORA_PASSPHRASE";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Agora node: wallet ledger and offline mailbox.
#[derive(Debug, Parser)]
#[command(name = "agora-node", version, about)]
pub struct Cli {
    /// Data directory (default: platform-specific).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Load settings from a JSON config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store passphrase (or set AGORA_PASSPHRASE). Empty means plaintext.
    #[arg(long, global = true)]
    pub passphrase: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the wallet seed and identity key.
    Init {
        /// Restore from an existing phrase instead of generating one.
        #[arg(long)]
        mnemonic: Option<String>,
    },
    /// Run the background schedulers until interrupted.
    Run,
    /// Show the unconfirmed and confirmed balance.
    Balance,
    /// Show an unused receive address.
    Address,
    /// Spend `amount` base units to `destination`.
    Spend {
        amount: u64,
        destination: String,
        /// Fee tier: priority, normal or economic.
        #[arg(long, default_value = "normal")]
        tier: String,
    },
    /// Print the recovery phrase.
    Mnemonic,
    /// Copy the whole store to another directory.
    Export {
        destination: PathBuf,
        /// Passphrase for the copy (empty for plaintext).
        #[arg(long = "to-passphrase", default_value = "")]
        to_passphrase: String,
    },
    /// List recorded transactions.
    Transactions,
    /// Re-check ledger invariants and leave read-only mode if they hold.
    Reconcile,
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format.
///
/// Example `agora.json`:
/// ```json
/// {
///   "data_dir": "/var/lib/agora",
///   "pointer_ttl_secs": 604800,
///   "mailbox_poll_interval_secs": 300,
///   "exchange_currency": "EUR"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfigFile {
    pub data_dir: Option<String>,
    pub passphrase: Option<String>,
    #[serde(flatten)]
    pub app: AppConfig,
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Fully resolved node configuration with all defaults applied.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub passphrase: String,
    pub app: AppConfig,
}

impl NodeConfig {
    /// Build config purely from CLI args with defaults.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            data_dir: cli.data_dir.clone().unwrap_or_else(default_data_dir),
            passphrase: String::new(),
            app: AppConfig::default(),
        }
        .merge_cli(cli)
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AgoraError::Config {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        let file: NodeConfigFile = serde_json::from_str(&text).map_err(|e| AgoraError::Config {
            reason: format!("invalid config JSON: {e}"),
        })?;

        Ok(Self {
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or_else(default_data_dir),
            passphrase: file.passphrase.unwrap_or_default(),
            app: file.app,
        })
    }

    /// Merge CLI overrides onto a config-file base.
    ///
    /// The passphrase comes from the flag, then the environment, then the
    /// file.
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(ref dir) = cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(ref pass) = cli.passphrase {
            self.passphrase = pass.clone();
        } else if let Ok(pass) = std::env::var(PASSPHRASE_ENV) {
            self.passphrase = pass;
        }
        self
    }

    /// Resolves the config for `cli`, reading its `--config` file if given.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Self::load(path)?.merge_cli(cli),
            None => Self::from_cli(cli),
        };
        config.app.validate()?;
        Ok(config)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_DIR)
    }
}

/// Store subdirectory under the data directory.
pub const STORE_DIR: &str = "store";

/// Platform-specific default data directory.
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".agora");
        }
    }
    if let Some(data) = dirs::data_dir() {
        return data.join("Agora");
    }
    PathBuf::from("agora-data")
}
