//! Outgoing transaction builder
//!
//! Assembles a signed transaction from selected inputs, destinations, a change address and a
//! fee. The extra field always starts with the tagged transaction public key.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::node::{OutputId, Transaction, TransactionInput, TransactionOutput};
use crate::transaction::address::AccountAddress;
use crate::transaction::keys::{AccountKeys, PublicKey, random_transaction_key};
use crate::transaction::{TX_EXTRA_PUBLIC_KEY_SIZE, TX_EXTRA_PUBLIC_KEY_TAG};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionError {
	#[error("Transaction validation error: {0}")]
	ValidationError(String),

	#[error("Insufficient balance: required {required}, available {available}")]
	InsufficientBalance { required: u64, available: u64 },

	#[error("Transaction size {size} exceeds the limit of {limit} bytes")]
	TooBig { size: usize, limit: usize },
}

/// An owned output being spent, with the key material to sign for it.
#[derive(Debug, Clone)]
pub struct InputToSpend {
	pub output_id: OutputId,
	pub amount: u64,
	pub keys: AccountKeys,
	/// Other ring members
	pub decoys: Vec<OutputId>,
}

/// Builder for outgoing transactions
#[derive(Debug, Default)]
pub struct TransactionBuilder {
	inputs: Vec<InputToSpend>,
	destinations: Vec<TransactionOutput>,
	change_key: Option<PublicKey>,
	fee: u64,
	unlock_time: u64,
	extra: Vec<u8>,
	max_size: Option<usize>,
}

impl TransactionBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_input(mut self, input: InputToSpend) -> Self {
		self.inputs.push(input);
		self
	}

	pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = InputToSpend>) -> Self {
		self.inputs.extend(inputs);
		self
	}

	/// Adds a payment; destinations keep their insertion order in the outputs.
	pub fn with_destination(mut self, address: &AccountAddress, amount: u64) -> Self {
		self.destinations.push(TransactionOutput {
			amount,
			key: address.spend_public,
		});
		self
	}

	/// Sets where the difference between inputs and payments plus fee goes
	pub fn with_change_address(mut self, address: &AccountAddress) -> Self {
		self.change_key = Some(address.spend_public);
		self
	}

	pub fn with_fee(mut self, fee: u64) -> Self {
		self.fee = fee;
		self
	}

	pub fn with_unlock_time(mut self, unlock_time: u64) -> Self {
		self.unlock_time = unlock_time;
		self
	}

	/// Caller data appended after the transaction public key
	pub fn with_extra(mut self, extra: Vec<u8>) -> Self {
		self.extra = extra;
		self
	}

	pub fn with_max_size(mut self, max_size: usize) -> Self {
		self.max_size = Some(max_size);
		self
	}

	/// Builds and signs the transaction
	pub fn build(self) -> Result<Transaction, TransactionError> {
		if self.inputs.is_empty() {
			return Err(TransactionError::ValidationError(
				"transaction has no inputs".to_string(),
			));
		}
		if self.destinations.is_empty() {
			return Err(TransactionError::ValidationError(
				"transaction has no destinations".to_string(),
			));
		}
		if self.destinations.iter().any(|d| d.amount == 0) {
			return Err(TransactionError::ValidationError(
				"destination amount must be positive".to_string(),
			));
		}

		let available = self
			.inputs
			.iter()
			.try_fold(0u64, |acc, input| acc.checked_add(input.amount))
			.ok_or_else(|| TransactionError::ValidationError("input sum overflows".to_string()))?;
		let required = self
			.destinations
			.iter()
			.try_fold(self.fee, |acc, output| acc.checked_add(output.amount))
			.ok_or_else(|| TransactionError::ValidationError("output sum overflows".to_string()))?;
		if available < required {
			return Err(TransactionError::InsufficientBalance {
				required,
				available,
			});
		}

		let mut outputs = self.destinations;
		let change = available - required;
		if change > 0 {
			let key = self.change_key.ok_or_else(|| {
				TransactionError::ValidationError("change address is not set".to_string())
			})?;
			outputs.push(TransactionOutput { amount: change, key });
		}

		let mut extra = Vec::with_capacity(TX_EXTRA_PUBLIC_KEY_SIZE + self.extra.len());
		extra.push(TX_EXTRA_PUBLIC_KEY_TAG);
		extra.extend_from_slice(&random_transaction_key().0);
		extra.extend_from_slice(&self.extra);

		let mut transaction = Transaction {
			version: 1,
			unlock_time: self.unlock_time,
			inputs: self
				.inputs
				.iter()
				.map(|input| TransactionInput::Key {
					amount: input.amount,
					output_id: input.output_id,
					decoys: input.decoys.clone(),
				})
				.collect(),
			outputs,
			extra,
			signatures: Vec::new(),
		};

		let prefix_hash = transaction.prefix_hash();
		transaction.signatures = self
			.inputs
			.iter()
			.map(|input| input.keys.sign_ring(&prefix_hash, input.decoys.len() + 1))
			.collect();

		let size = transaction.to_blob().len();
		if let Some(limit) = self.max_size {
			if size > limit {
				return Err(TransactionError::TooBig { size, limit });
			}
		}

		debug!(
			"Built transaction {} with {} inputs, {} outputs, {} bytes",
			transaction.hash(),
			transaction.inputs.len(),
			transaction.outputs.len(),
			size
		);
		Ok(transaction)
	}
}
