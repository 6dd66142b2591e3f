#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use wallet_state_sync::config::KdfConfig;
use wallet_state_sync::node::in_memory::DEFAULT_BLOCK_REWARD;
use wallet_state_sync::node::{Block, Node, NodeError, NodeObserver, OutputId, Transaction};
use wallet_state_sync::transaction::address::AccountAddress;
use wallet_state_sync::{InMemoryNode, Wallet, WalletConfig, WalletEvent};

pub const DEPTH: u64 = 10;
pub const FEE: u64 = 1_000_000;
pub const REWARD: u64 = DEFAULT_BLOCK_REWARD;

pub fn config() -> WalletConfig {
	let mut config = WalletConfig::default();
	config.currency.confirmation_depth = DEPTH;
	config.currency.minimum_fee = FEE;
	config.kdf = KdfConfig {
		mem_kib: 64,
		time_cost: 1,
	};
	config
}

pub fn node() -> Arc<InMemoryNode> {
	Arc::new(InMemoryNode::new())
}

/// Initialized wallet with one address, synchronized with `node`.
pub async fn open_wallet(node: &Arc<InMemoryNode>) -> (Wallet<InMemoryNode>, String) {
	let mut wallet = Wallet::new(node.clone(), config());
	wallet.initialize("pass").unwrap();
	let address = wallet.create_address().unwrap();
	wallet.process_notifications().await.unwrap();
	(wallet, address)
}

pub fn parse(address: &str) -> AccountAddress {
	AccountAddress::decode(address).unwrap()
}

/// Notifies observers and applies the notifications to every wallet.
pub async fn sync(node: &InMemoryNode, wallets: &mut [&mut Wallet<InMemoryNode>]) {
	node.update_observers();
	for wallet in wallets.iter_mut() {
		wallet.process_notifications().await.unwrap();
	}
}

/// Mines a reward to `address` and enough blocks to unlock it.
pub async fn fund(node: &InMemoryNode, wallet: &mut Wallet<InMemoryNode>, address: &str) {
	node.generate_block_reward(&parse(address));
	node.generate_empty_blocks(DEPTH as usize);
	sync(node, &mut [wallet]).await;
}

pub fn drain_events(wallet: &mut Wallet<InMemoryNode>) -> Vec<WalletEvent> {
	let mut events = Vec::new();
	while let Some(event) = wallet.poll_event().unwrap() {
		events.push(event);
	}
	events
}

/// [`InMemoryNode`] with switchable misbehavior.
pub struct FaultyNode {
	pub inner: Arc<InMemoryNode>,
	stall_blocks: AtomicBool,
	repeat_outputs: AtomicBool,
}

impl FaultyNode {
	pub fn new(inner: Arc<InMemoryNode>) -> Self {
		Self {
			inner,
			stall_blocks: AtomicBool::new(false),
			repeat_outputs: AtomicBool::new(false),
		}
	}

	/// Makes `get_blocks` never resolve.
	pub fn stall_blocks(&self, stall: bool) {
		self.stall_blocks.store(stall, Ordering::SeqCst);
	}

	/// Makes `random_outputs` answer with one output repeated.
	pub fn repeat_outputs(&self, repeat: bool) {
		self.repeat_outputs.store(repeat, Ordering::SeqCst);
	}
}

#[async_trait::async_trait]
impl Node for FaultyNode {
	fn subscribe(&self, observer: Arc<dyn NodeObserver>) {
		self.inner.subscribe(observer);
	}

	fn unsubscribe(&self, observer: &Arc<dyn NodeObserver>) {
		self.inner.unsubscribe(observer);
	}

	async fn get_blocks(&self, start_height: u64, count: u64) -> Result<Vec<Block>, NodeError> {
		if self.stall_blocks.load(Ordering::SeqCst) {
			std::future::pending::<()>().await;
		}
		self.inner.get_blocks(start_height, count).await
	}

	async fn relay_transaction(&self, transaction: &Transaction) -> Result<(), NodeError> {
		self.inner.relay_transaction(transaction).await
	}

	async fn top_block_height(&self) -> Result<u64, NodeError> {
		self.inner.top_block_height().await
	}

	async fn max_mixin(&self) -> Result<u64, NodeError> {
		self.inner.max_mixin().await
	}

	async fn random_outputs(&self, count: usize) -> Result<Vec<OutputId>, NodeError> {
		let outputs = self.inner.random_outputs(count).await?;
		if !self.repeat_outputs.load(Ordering::SeqCst) {
			return Ok(outputs);
		}
		Ok(outputs.first().map(|first| vec![*first; count]).unwrap_or_default())
	}
}
