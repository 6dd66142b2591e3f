//! Wallet Synchronization Module
//!
//! Keeps the wallet state in step with the node's chain:
//!
//! - `engine`: reacts to node notifications, fetches and orders blocks, handles detachments.
//! - `block_processor`: applies one block to the output ledger, the transaction cache and the
//!   balances.
//! - `progress_tracker`: tracks applied heights, detects gaps and logs progress.

/// Applies blocks to wallet state
pub mod block_processor;
/// Notification-driven synchronization engine
pub mod engine;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;

pub use engine::{BatchOutcome, SyncEngine, SyncError, SyncStatus};
pub use progress_tracker::{SyncProgressTracker, SyncStats};
