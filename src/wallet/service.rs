//!
//! Wallet service.
//!
//! `Wallet` owns the state of an initialized wallet and is the single place where it is mutated.
//! Node notifications are queued by an observer that the wallet subscribes to its node and are
//! applied on the caller's task whenever it waits for events (or drains them explicitly with
//! [`Wallet::process_notifications`]).

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::WalletConfig;
use crate::node::{Node, NodeNotification, NodeObserver, NotificationSender};
use crate::transaction::COIN_DECIMALS;
use crate::transaction::address::AccountAddress;
use crate::utils::format_amount;
use crate::wallet::address_registry::AddressRegistry;
use crate::wallet::events::{EventNotifier, StopHandle, WalletEvent};
use crate::wallet::persistence::{
	CacheSection, ContainerCodec, WalletRepository, WalletSnapshot, WalletStateCodec, codec_for,
};
use crate::wallet::state::WalletState;
use crate::wallet::sync::{SyncEngine, SyncStatus};
use crate::wallet::types::{Balance, WalletError, WalletTransaction, WalletTransfer};

pub struct Wallet<N: Node> {
	pub(super) node: Arc<N>,
	pub(super) config: WalletConfig,
	pub(super) state: Option<WalletState>,
	password: String,
	pub(super) events: EventNotifier,
	engine: SyncEngine,
	sender: NotificationSender,
	observer: Arc<dyn NodeObserver>,
	notifications: mpsc::UnboundedReceiver<NodeNotification>,
	subscribed: bool,
}

impl<N: Node> Wallet<N> {
	pub fn new(node: Arc<N>, config: WalletConfig) -> Self {
		let (sender, notifications) = NotificationSender::channel();
		Self {
			node,
			engine: SyncEngine::new(&config),
			config,
			state: None,
			password: String::new(),
			events: EventNotifier::new(),
			observer: Arc::new(sender.clone()),
			sender,
			notifications,
			subscribed: false,
		}
	}

	pub fn config(&self) -> &WalletConfig {
		&self.config
	}

	pub fn is_initialized(&self) -> bool {
		self.state.is_some()
	}

	pub fn sync_status(&self) -> SyncStatus {
		self.engine.status()
	}

	pub(super) fn state(&self) -> Result<&WalletState, WalletError> {
		self.state.as_ref().ok_or(WalletError::NotInitialized)
	}

	fn state_mut(&mut self) -> Result<&mut WalletState, WalletError> {
		self.state.as_mut().ok_or(WalletError::NotInitialized)
	}

	/// Creates an empty wallet protected by `password`.
	pub fn initialize(&mut self, password: &str) -> Result<(), WalletError> {
		if self.state.is_some() {
			return Err(WalletError::AlreadyInitialized);
		}
		self.state = Some(WalletState::new(
			AddressRegistry::new(),
			self.config.currency.confirmation_depth,
		));
		self.password = password.to_string();
		self.attach();
		info!("Initialized new wallet");
		Ok(())
	}

	/// Restores a wallet from `reader`, in the current or the legacy format. On any error the
	/// wallet stays uninitialized.
	pub async fn load<R>(&mut self, reader: &mut R, password: &str) -> Result<(), WalletError>
	where
		R: AsyncRead + Unpin,
	{
		if self.state.is_some() {
			return Err(WalletError::AlreadyInitialized);
		}
		let mut data = Vec::new();
		reader
			.read_to_end(&mut data)
			.await
			.map_err(|e| WalletError::Persistence(e.into()))?;
		self.restore(&data, password)
	}

	fn restore(&mut self, data: &[u8], password: &str) -> Result<(), WalletError> {
		let snapshot = codec_for(data, self.config.kdf)?.decode(data, password)?;
		let depth = self.config.currency.confirmation_depth;

		let mut state = WalletState::new(AddressRegistry::from_accounts(snapshot.accounts), depth);
		let had_cache = snapshot.cache.is_some();
		if let Some(cache) = snapshot.cache {
			state.ledger = cache.ledger;
			state.chain = cache.chain;
		}
		state.transactions = snapshot.details.unwrap_or_default();
		state.refresh_balances(depth);

		info!(
			"Loaded wallet: {} addresses, {} transactions, {} blocks{}",
			state.addresses.len(),
			state.transactions.len(),
			state.chain.len(),
			if had_cache { "" } else { " (resync required)" }
		);
		self.state = Some(state);
		self.password = password.to_string();
		self.attach();
		Ok(())
	}

	fn snapshot(&self, include_cache: bool, include_details: bool) -> Result<WalletSnapshot, WalletError> {
		let state = self.state()?;
		Ok(WalletSnapshot {
			accounts: state.addresses.accounts().to_vec(),
			cache: include_cache.then(|| CacheSection {
				ledger: state.ledger.clone(),
				chain: state.chain.clone(),
			}),
			details: include_details.then(|| state.transactions.clone()),
		})
	}

	/// Encodes the wallet into an encrypted container.
	pub fn export(&self, include_cache: bool, include_details: bool) -> Result<Vec<u8>, WalletError> {
		let snapshot = self.snapshot(include_cache, include_details)?;
		Ok(ContainerCodec::new(self.config.kdf).encode(&snapshot, &self.password)?)
	}

	pub async fn save<W>(&self, writer: &mut W, include_cache: bool, include_details: bool) -> Result<(), WalletError>
	where
		W: AsyncWrite + Unpin,
	{
		let container = self.export(include_cache, include_details)?;
		writer
			.write_all(&container)
			.await
			.map_err(|e| WalletError::Persistence(e.into()))?;
		writer
			.flush()
			.await
			.map_err(|e| WalletError::Persistence(e.into()))?;
		debug!("Saved wallet container of {} bytes", container.len());
		Ok(())
	}

	pub async fn save_to_repository(
		&self,
		repository: &dyn WalletRepository,
		include_cache: bool,
		include_details: bool,
	) -> Result<(), WalletError> {
		let container = self.export(include_cache, include_details)?;
		let height = self.state()?.chain.top_height().unwrap_or_default();
		repository.save(&container, height).await?;
		Ok(())
	}

	/// Loads the wallet stored in `repository`. Returns false when it holds none.
	pub async fn load_from_repository(
		&mut self,
		repository: &dyn WalletRepository,
		password: &str,
	) -> Result<bool, WalletError> {
		if self.state.is_some() {
			return Err(WalletError::AlreadyInitialized);
		}
		let Some((container, metadata)) = repository.load().await? else {
			return Ok(false);
		};
		self.restore(&container, password)?;
		debug!("Repository metadata: {:?}", metadata);
		Ok(true)
	}

	pub fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<(), WalletError> {
		self.state()?;
		if self.password != old_password {
			return Err(WalletError::WrongPassword);
		}
		self.password = new_password.to_string();
		Ok(())
	}

	pub fn create_address(&mut self) -> Result<String, WalletError> {
		let address = self.state_mut()?.addresses.create();
		info!("Created address {}", address);
		Ok(address.encode())
	}

	/// Removes an address together with its outputs and balance.
	pub fn delete_address(&mut self, address: &str) -> Result<(), WalletError> {
		let address = AccountAddress::decode(address)?;
		let Self { state, events, .. } = self;
		let state = state.as_mut().ok_or(WalletError::NotInitialized)?;
		if state.addresses.remove(&address).is_none() {
			return Err(WalletError::AddressNotFound(address.encode()));
		}
		let deltas = state.ledger.remove_owner(&address.spend_public);
		if state.balances.apply(&deltas) {
			events.push(WalletEvent::BalanceUpdated);
		}
		info!("Deleted address {}", address);
		Ok(())
	}

	pub fn get_address(&self, index: usize) -> Result<String, WalletError> {
		let addresses = &self.state()?.addresses;
		addresses
			.get(index)
			.map(|keys| keys.address().encode())
			.ok_or(WalletError::IndexOutOfRange {
				index,
				count: addresses.len(),
			})
	}

	pub fn get_address_count(&self) -> Result<usize, WalletError> {
		Ok(self.state()?.addresses.len())
	}

	fn balance_of(&self, address: &str) -> Result<Balance, WalletError> {
		let state = self.state()?;
		let address = AccountAddress::decode(address)?;
		if state.addresses.position(&address).is_none() {
			return Err(WalletError::AddressNotFound(address.encode()));
		}
		Ok(state.balances.balance_of(&address.spend_public))
	}

	pub fn get_actual_balance(&self) -> Result<u64, WalletError> {
		Ok(self.state()?.balances.total().actual)
	}

	pub fn get_actual_balance_of(&self, address: &str) -> Result<u64, WalletError> {
		Ok(self.balance_of(address)?.actual)
	}

	pub fn get_pending_balance(&self) -> Result<u64, WalletError> {
		Ok(self.state()?.balances.total().pending)
	}

	pub fn get_pending_balance_of(&self, address: &str) -> Result<u64, WalletError> {
		Ok(self.balance_of(address)?.pending)
	}

	pub fn get_transaction_count(&self) -> Result<usize, WalletError> {
		Ok(self.state()?.transactions.len())
	}

	pub fn get_transaction(&self, index: usize) -> Result<WalletTransaction, WalletError> {
		self.state()?.transactions.get(index).cloned()
	}

	pub fn get_transaction_transfer_count(&self, index: usize) -> Result<usize, WalletError> {
		Ok(self.state()?.transactions.transfers(index)?.len())
	}

	pub fn get_transaction_transfer(&self, index: usize, transfer_index: usize) -> Result<WalletTransfer, WalletError> {
		self.state()?
			.transactions
			.transfer(index, transfer_index)
			.cloned()
	}

	/// Re-arms event delivery after [`Wallet::stop`].
	pub fn start(&mut self) -> Result<(), WalletError> {
		self.state()?;
		self.events.start();
		Ok(())
	}

	/// Cancels current and future waits until [`Wallet::start`] is called.
	pub fn stop(&mut self) -> Result<(), WalletError> {
		self.state()?;
		self.events.stop();
		Ok(())
	}

	/// Handle that stops the wallet from another task.
	pub fn stop_handle(&self) -> StopHandle {
		self.events.stop_handle()
	}

	pub(super) fn ensure_running(&self) -> Result<(), WalletError> {
		self.state()?;
		if self.events.is_stopped() {
			return Err(WalletError::Stopped);
		}
		Ok(())
	}

	/// Returns a queued event without waiting for the node.
	pub fn poll_event(&mut self) -> Result<Option<WalletEvent>, WalletError> {
		self.state()?;
		self.events.pop()
	}

	/// Returns the next event, applying node notifications while none is queued.
	pub async fn wait_event(&mut self) -> Result<WalletEvent, WalletError> {
		self.state()?;
		loop {
			if let Some(event) = self.events.pop()? {
				return Ok(event);
			}

			let stop = self.events.stop_handle();
			let received = tokio::select! {
				biased;
				_ = stop.stopped() => None,
				received = self.receive_notification() => Some(received),
			};
			match received {
				Some(true) => {}
				Some(false) => return Err(WalletError::Stopped),
				None => {
					self.interrupt_sync();
					return Err(WalletError::Stopped);
				}
			}
		}
	}

	/// Waits for the next node notification and applies it. Returns false once the channel is
	/// closed.
	async fn receive_notification(&mut self) -> bool {
		match self.notifications.recv().await {
			Some(notification) => {
				self.handle_notification(notification).await;
				true
			}
			None => false,
		}
	}

	/// Abandons a synchronization cut short by `stop`. Blocks are applied whole, so the state is
	/// consistent; the wallet catches up from its top on the next run.
	fn interrupt_sync(&mut self) {
		if self.engine.status() != SyncStatus::Synced {
			self.engine.interrupt();
			self.sender.send(NodeNotification::ChainUpdated { top_height: 0 });
		}
	}

	/// Applies every node notification queued so far.
	pub async fn process_notifications(&mut self) -> Result<(), WalletError> {
		self.state()?;
		while let Ok(notification) = self.notifications.try_recv() {
			self.handle_notification(notification).await;
		}
		Ok(())
	}

	async fn handle_notification(&mut self, notification: NodeNotification) {
		let Some(state) = self.state.as_mut() else {
			return;
		};
		debug!("Handling {:?}", notification);
		self.engine
			.handle_notification(self.node.as_ref(), state, &mut self.events, notification)
			.await;
	}

	/// Drops all wallet state. The wallet can be initialized or loaded again afterwards.
	pub fn shutdown(&mut self) -> Result<(), WalletError> {
		self.state()?;
		self.detach();
		self.state = None;
		self.password.clear();
		self.events.clear();
		self.events.start();
		self.engine = SyncEngine::new(&self.config);
		while self.notifications.try_recv().is_ok() {}
		info!("Wallet shut down");
		Ok(())
	}

	pub fn log_balances(&self) -> Result<(), WalletError> {
		let state = self.state()?;
		for keys in state.addresses.accounts() {
			let balance = state.balances.balance_of(&keys.spend_public);
			info!(
				"{}: actual {}, pending {}",
				keys.address(),
				format_amount(balance.actual, COIN_DECIMALS),
				format_amount(balance.pending, COIN_DECIMALS)
			);
		}
		Ok(())
	}

	fn attach(&mut self) {
		if !self.subscribed {
			self.node.subscribe(self.observer.clone());
			self.subscribed = true;
		}
		// catch up with whatever the node already has
		self.sender.send(NodeNotification::ChainUpdated { top_height: 0 });
	}

	fn detach(&mut self) {
		if self.subscribed {
			self.node.unsubscribe(&self.observer);
			self.subscribed = false;
		}
	}
}

impl<N: Node> Drop for Wallet<N> {
	fn drop(&mut self) {
		self.detach();
	}
}
