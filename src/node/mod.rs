//!
//! Blockchain node collaborator.
//!
//! Defines the data the wallet consumes from a node (blocks, transactions, notifications), the
//! [`Node`] trait through which it queries and relays, and an in-memory implementation used by
//! the tests and the demo binary.
mod client;
pub mod in_memory;
mod types;

pub use client::*;
pub use in_memory::InMemoryNode;
pub use types::*;
