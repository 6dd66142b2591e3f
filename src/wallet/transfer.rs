//! Outgoing transfers.

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::node::{Node, NodeError, OutputId};
use crate::transaction::address::AccountAddress;
use crate::transaction::builder::{InputToSpend, TransactionBuilder};
use crate::transaction::selection::select_oldest_first;
use crate::transaction::{COIN_DECIMALS, UNCONFIRMED_TRANSACTION_HEIGHT};
use crate::utils::format_amount;
use crate::wallet::events::WalletEvent;
use crate::wallet::ledger::{BalanceDelta, OutputRecord};
use crate::wallet::service::Wallet;
use crate::wallet::transactions::TransactionOrigin;
use crate::wallet::types::{TransactionState, WalletError, WalletTransaction, WalletTransfer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDestination {
	pub address: String,
	pub amount: i64,
}

/// Parameters of [`Wallet::transfer`]
#[derive(Debug, Clone, Default)]
pub struct TransferRequest {
	pub destinations: Vec<TransferDestination>,
	pub fee: u64,
	pub mixin: u64,
	/// Spend only outputs of this address; change returns to it
	pub source_address: Option<String>,
	pub extra: Vec<u8>,
	pub unlock_time: u64,
}

impl TransferRequest {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_destination(mut self, address: impl Into<String>, amount: i64) -> Self {
		self.destinations.push(TransferDestination {
			address: address.into(),
			amount,
		});
		self
	}

	pub fn with_fee(mut self, fee: u64) -> Self {
		self.fee = fee;
		self
	}

	pub fn with_mixin(mut self, mixin: u64) -> Self {
		self.mixin = mixin;
		self
	}

	pub fn with_source_address(mut self, address: impl Into<String>) -> Self {
		self.source_address = Some(address.into());
		self
	}

	pub fn with_extra(mut self, extra: Vec<u8>) -> Self {
		self.extra = extra;
		self
	}

	pub fn with_unlock_time(mut self, unlock_time: u64) -> Self {
		self.unlock_time = unlock_time;
		self
	}
}

impl<N: Node> Wallet<N> {
	/// Builds, records and relays a transaction. Returns the index of its transaction record.
	///
	/// Validation failures leave the wallet untouched. Once the transaction is built it is
	/// recorded as `Created`; a relay failure marks it `Failed`, returns its inputs to the
	/// balance and is reported as the error.
	pub async fn transfer(&mut self, request: TransferRequest) -> Result<usize, WalletError> {
		self.ensure_running()?;

		if request.destinations.is_empty() {
			return Err(WalletError::WrongAmount(
				"at least one destination is required".to_string(),
			));
		}
		let mut destinations = Vec::with_capacity(request.destinations.len());
		let mut sent = 0u64;
		for destination in &request.destinations {
			if destination.amount <= 0 {
				return Err(WalletError::WrongAmount(format!(
					"amount {} for {} is not positive",
					destination.amount, destination.address
				)));
			}
			let address = AccountAddress::decode(&destination.address)?;
			let amount = destination.amount as u64;
			sent = sent
				.checked_add(amount)
				.ok_or_else(|| WalletError::WrongAmount("total amount overflows".to_string()))?;
			destinations.push((address, amount));
		}

		let minimum = self.config.currency.minimum_fee;
		if request.fee < minimum {
			return Err(WalletError::FeeTooSmall {
				fee: request.fee,
				minimum,
			});
		}
		let maximum = self.node.max_mixin().await?;
		if request.mixin > maximum {
			return Err(WalletError::MixinTooBig {
				mixin: request.mixin,
				maximum,
			});
		}

		let required = sent
			.checked_add(request.fee)
			.ok_or_else(|| WalletError::WrongAmount("total amount overflows".to_string()))?;
		let total_amount = i64::try_from(required)
			.map_err(|_| WalletError::WrongAmount(format!("total {} is too large", required)))?;

		let state = self.state()?;
		let source = match &request.source_address {
			Some(address) => {
				let address = AccountAddress::decode(address)?;
				if state.addresses.position(&address).is_none() {
					return Err(WalletError::AddressNotFound(address.encode()));
				}
				Some(address)
			}
			None => None,
		};
		let change_address = match &source {
			Some(address) => address.clone(),
			None => state
				.addresses
				.get(0)
				.map(|keys| keys.address())
				.ok_or(WalletError::InsufficientFunds {
					required,
					available: 0,
				})?,
		};

		let candidates = state
			.ledger
			.unspent_outputs_for(source.as_ref().map(|a| &a.spend_public), 0);
		let selected = select_oldest_first(&candidates, required).map_err(|e| {
			WalletError::InsufficientFunds {
				required: e.required,
				available: e.available,
			}
		})?;
		let mut spending = Vec::with_capacity(selected.len());
		for output in selected {
			let keys = state
				.addresses
				.keys_for(&output.owner)
				.ok_or_else(|| WalletError::AddressNotFound(hex::encode(output.owner.0)))?;
			spending.push((output.id, output.amount, keys.clone()));
		}
		debug!(
			"Selected {} outputs for a transfer of {}",
			spending.len(),
			format_amount(required, COIN_DECIMALS)
		);

		let mut inputs = Vec::with_capacity(spending.len());
		for (output_id, amount, keys) in spending {
			let decoys = self.fetch_decoys(&output_id, request.mixin).await?;
			inputs.push(InputToSpend {
				output_id,
				amount,
				keys,
				decoys,
			});
		}

		let mut builder = TransactionBuilder::new()
			.with_inputs(inputs)
			.with_change_address(&change_address)
			.with_fee(request.fee)
			.with_unlock_time(request.unlock_time)
			.with_extra(request.extra.clone())
			.with_max_size(self.config.currency.max_transaction_size);
		for (address, amount) in &destinations {
			builder = builder.with_destination(address, *amount);
		}
		let transaction = builder.build()?;
		let tx_hash = transaction.hash();

		let Self { state, events, .. } = self;
		let state = state.as_mut().ok_or(WalletError::NotInitialized)?;

		let record = WalletTransaction {
			state: TransactionState::Created,
			timestamp: 0,
			block_height: UNCONFIRMED_TRANSACTION_HEIGHT,
			hash: tx_hash,
			total_amount: -total_amount,
			fee: request.fee,
			creation_time: chrono::Utc::now().timestamp().max(0) as u64,
			unlock_time: request.unlock_time,
			extra: transaction.extra.clone(),
		};
		let transfers = request
			.destinations
			.iter()
			.map(|d| WalletTransfer {
				address: d.address.clone(),
				amount: -d.amount,
			})
			.collect();
		let index = state
			.transactions
			.append(record, transfers, TransactionOrigin::Local);
		events.push(WalletEvent::TransactionCreated {
			transaction_index: index,
		});

		let mut deltas: Vec<BalanceDelta> = Vec::new();
		for input in &transaction.inputs {
			if let crate::node::TransactionInput::Key { output_id, .. } = input {
				deltas.extend(state.ledger.reserve(output_id, tx_hash));
			}
		}
		for (position, output) in transaction.outputs.iter().enumerate() {
			if state.addresses.contains_owner(&output.key) {
				deltas.extend(state.ledger.record_output(OutputRecord {
					id: transaction.output_id(position as u32),
					owner: output.key,
					amount: output.amount,
					unlock_time: transaction.unlock_time,
					height: None,
				}));
			}
		}
		if state.balances.apply(&deltas) {
			events.push(WalletEvent::BalanceUpdated);
		}

		match self.node.relay_transaction(&transaction).await {
			Ok(()) => {
				let Self { state, events, .. } = self;
				let state = state.as_mut().ok_or(WalletError::NotInitialized)?;
				if state
					.transactions
					.update_state(index, TransactionState::Succeeded)?
				{
					events.push(WalletEvent::TransactionUpdated {
						transaction_index: index,
					});
				}
				info!(
					"Relayed transaction {} sending {} with fee {}",
					tx_hash,
					format_amount(sent, COIN_DECIMALS),
					format_amount(request.fee, COIN_DECIMALS)
				);
				Ok(index)
			}
			Err(e) => {
				warn!("Relay of transaction {} failed: {}", tx_hash, e);
				let Self { state, events, .. } = self;
				let state = state.as_mut().ok_or(WalletError::NotInitialized)?;
				if state
					.transactions
					.update_state(index, TransactionState::Failed)?
				{
					events.push(WalletEvent::TransactionUpdated {
						transaction_index: index,
					});
				}
				let deltas = state.ledger.release(&tx_hash);
				if state.balances.apply(&deltas) {
					events.push(WalletEvent::BalanceUpdated);
				}
				Err(WalletError::Node(e))
			}
		}
	}

	/// Asks the node for `mixin` distinct outputs other than `real`.
	async fn fetch_decoys(&self, real: &OutputId, mixin: u64) -> Result<Vec<OutputId>, WalletError> {
		if mixin == 0 {
			return Ok(Vec::new());
		}
		let mixin = mixin as usize;
		let decoys: Vec<OutputId> = self
			.node
			.random_outputs(mixin + 1)
			.await?
			.into_iter()
			.filter(|id| id != real)
			.unique()
			.take(mixin)
			.collect();
		if decoys.len() < mixin {
			warn!(
				"Node returned {} usable decoys for output {}:{}, {} requested",
				decoys.len(),
				real.tx_hash,
				real.index,
				mixin
			);
			return Err(NodeError::NotEnoughOutputs {
				requested: mixin,
				available: decoys.len(),
			}
			.into());
		}
		Ok(decoys)
	}
}
