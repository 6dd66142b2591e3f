//!
//! In-process node with a block generator.
//!
//! `InMemoryNode` implements [`Node`] over a chain held in memory. Blocks are produced
//! explicitly (rewards, funding transactions, empty blocks, pool mining) and observers are only
//! notified when [`InMemoryNode::update_observers`] is called, which makes wallet behaviour
//! fully deterministic in tests and in the demo binary.

use rand::seq::IndexedRandom;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::client::{Node, NodeObserver};
use super::types::*;
use crate::transaction::TX_EXTRA_PUBLIC_KEY_TAG;
use crate::transaction::address::AccountAddress;
use crate::transaction::keys::{PublicKey, random_transaction_key};

pub const DEFAULT_BLOCK_REWARD: u64 = 70_368_744_177_663;
pub const DEFAULT_MAX_MIXIN: u64 = 20;

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_INTERVAL_SECS: u64 = 120;

struct ChainState {
	blocks: Vec<Block>,
	pool: Vec<Transaction>,
	/// Outputs consumed by the chain or the pool
	spent: HashSet<OutputId>,
	block_reward: u64,
	max_mixin: u64,
	fail_next_relay: bool,
	pending_detach: Option<u64>,
}

impl ChainState {
	fn top_height(&self) -> u64 {
		self.blocks.len().saturating_sub(1) as u64
	}

	fn push_block(&mut self, reward_key: PublicKey, mut transactions: Vec<Transaction>) -> u64 {
		let height = self.blocks.len() as u64;
		let prev_hash = self.blocks.last().map(|b| b.hash).unwrap_or_default();
		let timestamp = GENESIS_TIMESTAMP + height * BLOCK_INTERVAL_SECS;

		let coinbase = Transaction {
			version: 1,
			unlock_time: 0,
			inputs: vec![TransactionInput::Coinbase { height }],
			outputs: vec![TransactionOutput {
				amount: self.block_reward,
				key: reward_key,
			}],
			extra: tagged_extra(),
			signatures: Vec::new(),
		};
		transactions.insert(0, coinbase);

		for tx in &transactions {
			for input in &tx.inputs {
				if let TransactionInput::Key { output_id, .. } = input {
					self.spent.insert(*output_id);
				}
			}
		}

		let hash = Block::compute_hash(height, &prev_hash, timestamp, &transactions);
		self.blocks.push(Block {
			height,
			hash,
			prev_hash,
			timestamp,
			transactions,
		});
		height
	}

	fn rebuild_spent(&mut self) {
		self.spent = self
			.blocks
			.iter()
			.flat_map(|b| b.transactions.iter())
			.chain(self.pool.iter())
			.flat_map(|tx| tx.inputs.iter())
			.filter_map(|input| match input {
				TransactionInput::Key { output_id, .. } => Some(*output_id),
				TransactionInput::Coinbase { .. } => None,
			})
			.collect();
	}
}

fn tagged_extra() -> Vec<u8> {
	let mut extra = vec![TX_EXTRA_PUBLIC_KEY_TAG];
	extra.extend_from_slice(&random_transaction_key().0);
	extra
}

pub struct InMemoryNode {
	chain: Mutex<ChainState>,
	observers: Mutex<Vec<Arc<dyn NodeObserver>>>,
}

impl Default for InMemoryNode {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryNode {
	/// Creates a node whose chain holds only the genesis block.
	pub fn new() -> Self {
		Self::with_block_reward(DEFAULT_BLOCK_REWARD)
	}

	pub fn with_block_reward(block_reward: u64) -> Self {
		let mut chain = ChainState {
			blocks: Vec::new(),
			pool: Vec::new(),
			spent: HashSet::new(),
			block_reward,
			max_mixin: DEFAULT_MAX_MIXIN,
			fail_next_relay: false,
			pending_detach: None,
		};
		chain.push_block(random_transaction_key(), Vec::new());
		Self {
			chain: Mutex::new(chain),
			observers: Mutex::new(Vec::new()),
		}
	}

	fn chain(&self) -> MutexGuard<'_, ChainState> {
		self.chain.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn observers(&self) -> Vec<Arc<dyn NodeObserver>> {
		self.observers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	/// Mines a block whose coinbase pays the block reward to `address`. Returns its height.
	pub fn generate_block_reward(&self, address: &AccountAddress) -> u64 {
		let mut chain = self.chain();
		let height = chain.push_block(address.spend_public, Vec::new());
		debug!("Generated block reward for {} at height {}", address, height);
		height
	}

	/// Mines a block containing one transaction paying exactly `amount` to `address`.
	pub fn generate_single_output_transaction(&self, address: &AccountAddress, amount: u64) -> u64 {
		let funding = Transaction {
			version: 1,
			unlock_time: 0,
			inputs: vec![TransactionInput::Key {
				amount,
				output_id: OutputId {
					tx_hash: Hash(random_transaction_key().0),
					index: 0,
				},
				decoys: Vec::new(),
			}],
			outputs: vec![TransactionOutput {
				amount,
				key: address.spend_public,
			}],
			extra: tagged_extra(),
			signatures: Vec::new(),
		};
		let mut chain = self.chain();
		chain.push_block(random_transaction_key(), vec![funding])
	}

	pub fn generate_empty_blocks(&self, count: usize) {
		let mut chain = self.chain();
		for _ in 0..count {
			chain.push_block(random_transaction_key(), Vec::new());
		}
	}

	/// Mines every pooled transaction into a new block. Returns the block height, if any.
	pub fn mine_pool(&self) -> Option<u64> {
		let mut chain = self.chain();
		if chain.pool.is_empty() {
			return None;
		}
		let pool = std::mem::take(&mut chain.pool);
		Some(chain.push_block(random_transaction_key(), pool))
	}

	/// Replaces every block at or above `height` with nothing; the next blocks generated form
	/// the alternative chain. Transactions of dropped blocks are discarded. Observers learn about
	/// the detachment on the next [`InMemoryNode::update_observers`].
	pub fn start_alternative_chain(&self, height: u64) {
		let mut chain = self.chain();
		let keep = height.max(1) as usize;
		if keep >= chain.blocks.len() {
			return;
		}
		chain.blocks.truncate(keep);
		chain.pool.clear();
		chain.rebuild_spent();
		let detach_to = keep as u64 - 1;
		chain.pending_detach = Some(
			chain
				.pending_detach
				.map_or(detach_to, |pending| pending.min(detach_to)),
		);
		info!("Started alternative chain above height {}", detach_to);
	}

	pub fn set_max_mixin(&self, max_mixin: u64) {
		self.chain().max_mixin = max_mixin;
	}

	/// Makes the next relayed transaction fail.
	pub fn set_next_transaction_error(&self) {
		self.chain().fail_next_relay = true;
	}

	pub fn height(&self) -> u64 {
		self.chain().top_height()
	}

	pub fn block(&self, height: u64) -> Option<Block> {
		self.chain().blocks.get(height as usize).cloned()
	}

	pub fn pool_size(&self) -> usize {
		self.chain().pool.len()
	}

	/// Mines the pool and notifies every observer about pending detachments and the new top.
	pub fn update_observers(&self) {
		self.mine_pool();
		let (detached, top) = {
			let mut chain = self.chain();
			(chain.pending_detach.take(), chain.top_height())
		};

		for observer in self.observers() {
			if let Some(height) = detached {
				observer.on_chain_detached(height);
			}
			observer.on_chain_updated(top);
		}
	}

	pub fn notify_pool_updated(&self) {
		for observer in self.observers() {
			observer.on_pool_updated();
		}
	}
}

#[async_trait::async_trait]
impl Node for InMemoryNode {
	fn subscribe(&self, observer: Arc<dyn NodeObserver>) {
		self.observers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(observer);
	}

	fn unsubscribe(&self, observer: &Arc<dyn NodeObserver>) {
		self.observers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.retain(|o| !Arc::ptr_eq(o, observer));
	}

	async fn get_blocks(&self, start_height: u64, count: u64) -> Result<Vec<Block>, NodeError> {
		let chain = self.chain();
		let start = start_height as usize;
		if start >= chain.blocks.len() {
			return Ok(Vec::new());
		}
		let end = chain.blocks.len().min(start.saturating_add(count as usize));
		Ok(chain.blocks[start..end].to_vec())
	}

	async fn relay_transaction(&self, transaction: &Transaction) -> Result<(), NodeError> {
		let mut chain = self.chain();
		if chain.fail_next_relay {
			chain.fail_next_relay = false;
			warn!("Refusing transaction {}", transaction.hash());
			return Err(NodeError::TransactionRejected(
				"transaction refused by node".to_string(),
			));
		}

		let mut consumed = Vec::new();
		for input in &transaction.inputs {
			match input {
				TransactionInput::Key { output_id, .. } => {
					if chain.spent.contains(output_id) || consumed.contains(output_id) {
						return Err(NodeError::DoubleSpend(*output_id));
					}
					consumed.push(*output_id);
				}
				TransactionInput::Coinbase { .. } => {
					return Err(NodeError::TransactionRejected(
						"coinbase input outside of a block".to_string(),
					));
				}
			}
		}

		chain.spent.extend(consumed);
		chain.pool.push(transaction.clone());
		debug!("Accepted transaction {} into the pool", transaction.hash());
		Ok(())
	}

	async fn top_block_height(&self) -> Result<u64, NodeError> {
		Ok(self.chain().top_height())
	}

	async fn max_mixin(&self) -> Result<u64, NodeError> {
		Ok(self.chain().max_mixin)
	}

	async fn random_outputs(&self, count: usize) -> Result<Vec<OutputId>, NodeError> {
		let chain = self.chain();
		let candidates: Vec<OutputId> = chain
			.blocks
			.iter()
			.flat_map(|b| b.transactions.iter())
			.flat_map(|tx| {
				let hash = tx.hash();
				(0..tx.outputs.len() as u32).map(move |index| OutputId {
					tx_hash: hash,
					index,
				})
			})
			.collect();

		if candidates.len() < count {
			return Err(NodeError::NotEnoughOutputs {
				requested: count,
				available: candidates.len(),
			});
		}
		Ok(candidates
			.choose_multiple(&mut rand::rng(), count)
			.copied()
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transaction::keys::AccountKeys;

	#[tokio::test]
	async fn test_blocks_link_to_their_parent() {
		let node = InMemoryNode::new();
		node.generate_empty_blocks(3);

		let blocks = node.get_blocks(0, 10).await.unwrap();
		assert_eq!(blocks.len(), 4);
		for pair in blocks.windows(2) {
			assert_eq!(pair[1].prev_hash, pair[0].hash);
			assert_eq!(pair[1].height, pair[0].height + 1);
		}
		assert!(node.get_blocks(4, 10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_relay_rejects_double_spend() {
		let node = InMemoryNode::new();
		let keys = AccountKeys::generate();
		node.generate_single_output_transaction(&keys.address(), 500);
		let funding = node.block(1).unwrap().transactions[1].clone();

		let spend = Transaction {
			version: 1,
			unlock_time: 0,
			inputs: vec![TransactionInput::Key {
				amount: 500,
				output_id: funding.output_id(0),
				decoys: Vec::new(),
			}],
			outputs: Vec::new(),
			extra: Vec::new(),
			signatures: Vec::new(),
		};
		node.relay_transaction(&spend).await.unwrap();
		assert_eq!(
			node.relay_transaction(&spend).await,
			Err(NodeError::DoubleSpend(funding.output_id(0)))
		);
		assert_eq!(node.mine_pool(), Some(2));
		assert_eq!(node.pool_size(), 0);
	}

	#[tokio::test]
	async fn test_alternative_chain_truncates() {
		let node = InMemoryNode::new();
		node.generate_empty_blocks(5);
		node.start_alternative_chain(2);
		assert_eq!(node.height(), 1);
		node.generate_empty_blocks(1);
		assert_eq!(node.height(), 2);
	}
}
