//! Agora node runtime.
//!
//! Wires the wallet ledger, the pointer directory and the message
//! mailbox over one encrypted store and runs their background loops.

pub mod chain_consumer;
pub mod config;
pub mod node;

pub use node::{initialize_wallet, load_node_id, LoopbackBroadcaster, Node, NodeState, Services};
