//!
//! Node collaborator contract.
//!
//! A wallet talks to the blockchain only through the [`Node`] trait. Notifications flow the other
//! way through [`NodeObserver`]; the node may call observers from any thread, so the wallet's
//! observer ([`NotificationSender`]) only enqueues into a FIFO channel that the wallet drains on
//! its own task.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use super::types::*;

/// Receives chain notifications. Implementations must be cheap and must not block.
pub trait NodeObserver: Send + Sync {
	fn on_chain_updated(&self, top_height: u64);
	fn on_chain_detached(&self, height: u64);
	fn on_pool_updated(&self);
}

/// Blockchain node as seen by the wallet.
#[async_trait::async_trait]
pub trait Node: Send + Sync {
	fn subscribe(&self, observer: Arc<dyn NodeObserver>);

	/// Removes an observer previously passed to [`Node::subscribe`], compared by pointer.
	fn unsubscribe(&self, observer: &Arc<dyn NodeObserver>);

	/// Returns up to `count` consecutive blocks starting at `start_height`.
	///
	/// An empty vector means the node has no block at `start_height`.
	async fn get_blocks(&self, start_height: u64, count: u64) -> Result<Vec<Block>, NodeError>;

	/// Submits a transaction; resolves once the node accepted or rejected it.
	async fn relay_transaction(&self, transaction: &Transaction) -> Result<(), NodeError>;

	async fn top_block_height(&self) -> Result<u64, NodeError>;

	/// Largest ring size minus one the node accepts.
	async fn max_mixin(&self) -> Result<u64, NodeError>;

	/// Random outputs usable as ring decoys.
	async fn random_outputs(&self, count: usize) -> Result<Vec<OutputId>, NodeError>;
}

/// Observer handed to the node by a wallet. Forwards notifications into the wallet's queue.
#[derive(Clone)]
pub struct NotificationSender {
	sender: mpsc::UnboundedSender<NodeNotification>,
}

impl NotificationSender {
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<NodeNotification>) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Self { sender }, receiver)
	}

	pub fn send(&self, notification: NodeNotification) {
		// the receiver is gone once its wallet shut down; late notifications are dropped
		if self.sender.send(notification).is_err() {
			trace!("Dropping notification {:?} for closed wallet", notification);
		}
	}
}

impl NodeObserver for NotificationSender {
	fn on_chain_updated(&self, top_height: u64) {
		self.send(NodeNotification::ChainUpdated { top_height });
	}

	fn on_chain_detached(&self, height: u64) {
		self.send(NodeNotification::ChainDetached { height });
	}

	fn on_pool_updated(&self) {
		self.send(NodeNotification::PoolUpdated);
	}
}
