//! Synchronization engine.
//!
//! The engine turns node notifications into wallet state changes. On a chain update it fetches
//! the blocks after the wallet's known top in batches and applies them strictly in height order.
//! On a detachment it unwinds everything above the fork height, recomputes balances and catches
//! up again. Failures never escape: they are reported as `SyncError` events and synchronization
//! resumes with the next notification.

use std::collections::HashSet;
use tracing::{debug, error, info, trace, warn};

use crate::config::WalletConfig;
use crate::node::{Block, Hash, Node, NodeError, NodeNotification};
use crate::wallet::events::{EventNotifier, WalletEvent};
use crate::wallet::state::WalletState;
use crate::wallet::sync::block_processor::BlockProcessor;
use crate::wallet::sync::progress_tracker::{SyncProgressTracker, SyncStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
	Synced,
	CatchingUp,
	Detaching,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Node error: {0}")]
	Node(#[from] NodeError),

	#[error("Node returned block {got} where block {expected} was expected")]
	UnexpectedHeight { expected: u64, got: u64 },

	#[error("Node chain does not share the wallet's genesis block")]
	GenesisMismatch,
}

/// Result of feeding a batch of blocks to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
	/// Every block was applied or already known
	Applied { blocks: usize },
	/// A block did not extend the wallet's chain; the wallet was detached above `height`
	Forked { height: u64 },
}

pub struct SyncEngine {
	status: SyncStatus,
	batch_size: u64,
	confirmation_depth: u64,
	processor: BlockProcessor,
}

impl SyncEngine {
	pub fn new(config: &WalletConfig) -> Self {
		Self {
			status: SyncStatus::Synced,
			batch_size: config.sync.batch_size.max(1),
			confirmation_depth: config.currency.confirmation_depth,
			processor: BlockProcessor::new(config.currency.confirmation_depth),
		}
	}

	pub fn status(&self) -> SyncStatus {
		self.status
	}

	pub async fn handle_notification<N: Node + ?Sized>(
		&mut self,
		node: &N,
		state: &mut WalletState,
		events: &mut EventNotifier,
		notification: NodeNotification,
	) {
		match notification {
			NodeNotification::ChainUpdated { top_height } => {
				self.synchronize(node, state, events, top_height).await;
			}
			NodeNotification::ChainDetached { height } => {
				self.detach(state, events, height);
				self.synchronize(node, state, events, height).await;
			}
			NodeNotification::PoolUpdated => {
				trace!("Pool updated");
			}
		}
	}

	/// Marks a synchronization that was dropped between batches as finished.
	pub fn interrupt(&mut self) {
		warn!("Synchronization interrupted at {:?}", self.status);
		self.status = SyncStatus::Synced;
	}

	/// Catches up with the node and reports the outcome as an event.
	pub async fn synchronize<N: Node + ?Sized>(
		&mut self,
		node: &N,
		state: &mut WalletState,
		events: &mut EventNotifier,
		top_hint: u64,
	) {
		self.status = SyncStatus::CatchingUp;
		match self.catch_up(node, state, events, top_hint).await {
			Ok(stats) => {
				if stats.has_processed_data {
					info!("{}", stats.summary());
				}
				events.push(WalletEvent::SyncCompleted);
			}
			Err(e) => {
				error!("Synchronization failed: {}", e);
				events.push(WalletEvent::SyncError {
					message: e.to_string(),
				});
			}
		}
		self.status = SyncStatus::Synced;
	}

	async fn catch_up<N: Node + ?Sized>(
		&mut self,
		node: &N,
		state: &mut WalletState,
		events: &mut EventNotifier,
		top_hint: u64,
	) -> Result<SyncStats, SyncError> {
		let mut tracker = SyncProgressTracker::new(state.chain.len());

		loop {
			let start = state.chain.len();
			let blocks = node.get_blocks(start, self.batch_size).await?;
			let Some(last) = blocks.last() else {
				break;
			};
			let total = top_hint.max(last.height);

			match self.apply_blocks(state, events, &blocks, &mut tracker)? {
				BatchOutcome::Applied { blocks: 0 } => break,
				BatchOutcome::Applied { .. } => {
					events.push(WalletEvent::SyncProgressUpdated {
						processed: state.chain.top_height().unwrap_or_default(),
						total,
					});
					tracker.log_progress(false);
				}
				BatchOutcome::Forked { height } => {
					tracker.record_detach(height);
				}
			}
		}

		tracker.log_progress(true);
		tracker.validate_completion();
		Ok(tracker.get_stats())
	}

	/// Applies consecutive blocks. Blocks the wallet already holds are skipped; a block that
	/// does not link to the wallet's top detaches the wallet one block lower.
	pub fn apply_blocks(
		&mut self,
		state: &mut WalletState,
		events: &mut EventNotifier,
		blocks: &[Block],
		tracker: &mut SyncProgressTracker,
	) -> Result<BatchOutcome, SyncError> {
		let mut applied = 0;
		for block in blocks {
			let expected = state.chain.len();
			if block.height < expected {
				if state.chain.hash_at(block.height) == Some(block.hash) {
					trace!("Skipping known block {}", block.height);
					continue;
				}
				// a different block at a known height replaces everything from there on
				let height = block.height.checked_sub(1).ok_or(SyncError::GenesisMismatch)?;
				warn!("Block {} differs from the wallet's chain", block.height);
				self.detach(state, events, height);
				return Ok(BatchOutcome::Forked { height });
			}
			if block.height != expected {
				return Err(SyncError::UnexpectedHeight {
					expected,
					got: block.height,
				});
			}

			let top_hash: Option<Hash> = state.chain.top().map(|b| b.hash);
			if let Some(top_hash) = top_hash {
				if block.prev_hash != top_hash {
					// the wallet's top block was replaced; back off one block and refetch
					let height = expected
						.checked_sub(2)
						.ok_or(SyncError::GenesisMismatch)?;
					warn!(
						"Block {} does not extend the wallet's chain, detaching above {}",
						block.height, height
					);
					self.detach(state, events, height);
					return Ok(BatchOutcome::Forked { height });
				}
			}

			let relevant = self.processor.apply_block(state, block, events);
			tracker.record_block(block.height, relevant);
			applied += 1;
		}
		Ok(BatchOutcome::Applied { blocks: applied })
	}

	/// Removes every effect of the blocks above `height`.
	pub fn detach(&mut self, state: &mut WalletState, events: &mut EventNotifier, height: u64) {
		if state.chain.len() <= height.saturating_add(1) {
			debug!("Ignoring detach above {}, wallet top is {:?}", height, state.chain.top_height());
			return;
		}
		self.status = SyncStatus::Detaching;
		warn!(
			"Detaching wallet chain above height {} (top was {:?})",
			height,
			state.chain.top_height()
		);

		state.chain.truncate_above(height);
		let local_pending: HashSet<Hash> = state.transactions.local_pending_hashes().collect();
		state.ledger.revert_above(height, &local_pending);

		if let Some(first) = state.transactions.first_index_above(height) {
			for index in state.transactions.remove_from(first, height) {
				events.push(WalletEvent::TransactionUpdated {
					transaction_index: index,
				});
			}
		}

		if state.refresh_balances(self.confirmation_depth) {
			events.push(WalletEvent::BalanceUpdated);
		}
		self.status = SyncStatus::CatchingUp;
	}
}
