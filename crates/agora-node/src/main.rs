//! Agora node binary.
//!
//! Usage:
//!
//!   agora-node [--data-dir PATH] [--config PATH] [--passphrase PASS] <COMMAND>
//!
//! `run` keeps the schedulers alive until Ctrl+C. Every other command
//! opens the store, performs one operation and exits.
//!
//! Environment:
//!
//!   AGORA_PASSPHRASE   Store passphrase when `--passphrase` is absent
//!   RUST_LOG           Log level filter (default: info)

use std::sync::Arc;

use agora_node::config::{Cli, Command, NodeConfig};
use agora_node::{initialize_wallet, Node, Services};
use agora_storage::Repository;
use agora_types::{AgoraError, FeeTier, Result};
use clap::Parser;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        tracing::error!("agora-node error: {e}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let cfg = NodeConfig::resolve(&cli)?;

    let store_path = cfg.store_path();
    std::fs::create_dir_all(&store_path).map_err(|e| AgoraError::Persistence {
        reason: format!("failed to create data directory: {e}"),
    })?;
    tracing::info!(data_dir = %cfg.data_dir.display(), "data directory ready");

    let repo = Arc::new(Repository::open(&store_path, &cfg.passphrase)?);

    if let Command::Init { mnemonic } = &cli.command {
        let phrase = initialize_wallet(&repo, mnemonic.as_deref())?;
        if mnemonic.is_none() {
            print_new_mnemonic(phrase.as_str());
        }
        return Ok(());
    }

    let (services, _chain_tx, chain_rx) = Services::in_memory();
    let mut node = Node::new(repo, cfg.app.clone(), services)?;

    match cli.command {
        Command::Init { .. } => {}
        Command::Run => {
            node.start(chain_rx)?;
            tracing::info!(node_id = %node.node_id(), "running, press Ctrl+C to stop");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
            }
            node.shutdown().await?;
        }
        Command::Balance => {
            let balance = node.get_balance()?;
            println!("confirmed:   {}", balance.confirmed);
            println!("unconfirmed: {}", balance.unconfirmed);
        }
        Command::Address => {
            let key = node.next_receive_address()?;
            println!("{}", key.script_pubkey);
        }
        Command::Spend {
            amount,
            destination,
            tier,
        } => {
            let tier: FeeTier = tier.parse()?;
            let record = node.spend(amount, &destination, tier).await?;
            println!("{} {} value={}", record.txid, record.state, record.value);
        }
        Command::Mnemonic => {
            println!("{}", node.get_mnemonic()?.as_str());
        }
        Command::Export {
            destination,
            to_passphrase,
        } => {
            let rows = node.export(&destination, &to_passphrase)?;
            println!("exported {rows} rows to {}", destination.display());
        }
        Command::Transactions => {
            for tx in node.transactions()? {
                let height = tx.height.map_or_else(|| "-".to_string(), |h| h.to_string());
                println!("{} {} value={} height={height}", tx.txid, tx.state, tx.value);
            }
        }
        Command::Reconcile => {
            node.reconcile()?;
            println!("ledger consistent");
        }
    }

    node.shutdown().await
}

fn print_new_mnemonic(words: &str) {
    println!();
    println!("============================================================");
    println!("  NEW WALLET CREATED -- SAVE YOUR MNEMONIC!");
    println!("============================================================");
    println!();
    println!("  {words}");
    println!();
    println!("  Write these words down and store them safely.");
    println!("  You will need them to recover your wallet.");
    println!("============================================================");
    println!();
}
