use serde::{Deserialize, Serialize};

use crate::node::Hash;
use crate::wallet::address_registry::AddressRegistry;
use crate::wallet::balance::BalanceAggregator;
use crate::wallet::ledger::{ChainView, OutputLedger};
use crate::wallet::transactions::TransactionCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
	pub hash: Hash,
	pub timestamp: u64,
}

/// Hashes of every block the wallet applied, indexed by height.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPosition {
	blocks: Vec<BlockSummary>,
}

impl ChainPosition {
	/// Number of applied blocks, which is also the next height to fetch.
	pub fn len(&self) -> u64 {
		self.blocks.len() as u64
	}

	pub fn is_empty(&self) -> bool {
		self.blocks.is_empty()
	}

	pub fn top_height(&self) -> Option<u64> {
		self.len().checked_sub(1)
	}

	pub fn top(&self) -> Option<&BlockSummary> {
		self.blocks.last()
	}

	pub fn hash_at(&self, height: u64) -> Option<Hash> {
		self.blocks.get(height as usize).map(|b| b.hash)
	}

	pub fn push(&mut self, hash: Hash, timestamp: u64) {
		self.blocks.push(BlockSummary { hash, timestamp });
	}

	/// Keeps blocks up to and including `height`.
	pub fn truncate_above(&mut self, height: u64) {
		self.blocks.truncate(height.saturating_add(1) as usize);
	}

	pub fn view(&self, confirmation_depth: u64) -> ChainView {
		ChainView {
			top_height: self.top_height(),
			top_timestamp: self.top().map_or(0, |b| b.timestamp),
			confirmation_depth,
		}
	}
}

/// Everything an initialized wallet holds.
#[derive(Debug, Clone, Default)]
pub struct WalletState {
	pub addresses: AddressRegistry,
	pub ledger: OutputLedger,
	pub transactions: TransactionCache,
	pub balances: BalanceAggregator,
	pub chain: ChainPosition,
}

impl WalletState {
	pub fn new(addresses: AddressRegistry, confirmation_depth: u64) -> Self {
		Self {
			addresses,
			ledger: OutputLedger::new(confirmation_depth),
			..Self::default()
		}
	}

	/// Brings the ledger view and the balances in line with the chain position.
	pub fn refresh_balances(&mut self, confirmation_depth: u64) -> bool {
		self.ledger.set_view(self.chain.view(confirmation_depth));
		self.balances.recompute(&self.ledger)
	}
}
