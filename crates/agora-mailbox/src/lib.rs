//! Offline message delivery for the Agora node.
//!
//! A sender stores a payload in the content store and publishes a pointer
//! to it under the recipient's rendezvous key. The recipient scans its own
//! rendezvous keys when it comes online and hands each pointer to the
//! [`MessageMailbox`], which fetches, dispatches and records it exactly
//! once. Authored pointers are republished until delivered or cancelled.

pub mod directory;
pub mod handler;
pub mod mailbox;
pub mod memory;
pub mod poller;
pub mod pointer;
pub mod rendezvous;
pub mod republish;
pub mod schedule;
pub mod transport;

pub use directory::{DirectoryConfig, PointerDirectory, PointerScan, RepublishReport};
pub use handler::{HandlerRegistry, PurposeHandler};
pub use mailbox::{MessageMailbox, ProcessOutcome};
pub use memory::{MemoryContentStore, MemoryLookup};
pub use rendezvous::rendezvous_key;
pub use schedule::{CycleStatus, Schedule};
pub use transport::{ContentStore, LookupService};
