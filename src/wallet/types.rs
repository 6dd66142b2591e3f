use crate::node::{Hash, NodeError};
use crate::transaction::address::AddressError;
use crate::transaction::builder::TransactionError;
use crate::wallet::persistence::PersistenceError;

use serde::{Deserialize, Serialize};

/// Lifecycle of a wallet-visible transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
	/// Built and recorded, relay outcome not known yet
	Created,
	Succeeded,
	Failed,
	/// Removed from the chain by a reorganization
	Deleted,
}

/// A transaction as reported to wallet callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
	pub state: TransactionState,
	/// Timestamp of the including block, 0 while unconfirmed
	pub timestamp: u64,
	/// Including block height or `UNCONFIRMED_TRANSACTION_HEIGHT`
	pub block_height: u64,
	pub hash: Hash,
	/// Net effect on the wallet; negative for outgoing transactions
	pub total_amount: i64,
	pub fee: u64,
	pub creation_time: u64,
	pub unlock_time: u64,
	pub extra: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransfer {
	pub address: String,
	pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
	pub actual: u64,
	pub pending: u64,
}

impl Balance {
	pub fn total(&self) -> u64 {
		self.actual.saturating_add(self.pending)
	}
}

/// Errors returned by wallet operations
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("Wallet is not initialized")]
	NotInitialized,

	#[error("Wallet is already initialized")]
	AlreadyInitialized,

	#[error("Wallet is stopped")]
	Stopped,

	#[error("Wrong password")]
	WrongPassword,

	#[error("Invalid address: {0}")]
	InvalidAddress(#[from] AddressError),

	#[error("Address is not managed by this wallet: {0}")]
	AddressNotFound(String),

	#[error("Index {index} is out of range (count {count})")]
	IndexOutOfRange { index: usize, count: usize },

	#[error("Wrong amount: {0}")]
	WrongAmount(String),

	#[error("Fee {fee} is below the minimum {minimum}")]
	FeeTooSmall { fee: u64, minimum: u64 },

	#[error("Mixin {mixin} exceeds the node maximum {maximum}")]
	MixinTooBig { mixin: u64, maximum: u64 },

	#[error("Insufficient funds: required {required}, available {available}")]
	InsufficientFunds { required: u64, available: u64 },

	#[error("Transaction is too big: {size} bytes, limit {limit}")]
	TransactionTooBig { size: usize, limit: usize },

	#[error("Transaction build error: {0}")]
	Transaction(TransactionError),

	#[error("Node error: {0}")]
	Node(#[from] NodeError),

	#[error("Persistence error: {0}")]
	Persistence(PersistenceError),
}

impl From<TransactionError> for WalletError {
	fn from(err: TransactionError) -> Self {
		match err {
			TransactionError::InsufficientBalance { required, available } => {
				WalletError::InsufficientFunds { required, available }
			}
			TransactionError::TooBig { size, limit } => WalletError::TransactionTooBig { size, limit },
			other => WalletError::Transaction(other),
		}
	}
}

impl From<PersistenceError> for WalletError {
	fn from(err: PersistenceError) -> Self {
		match err {
			PersistenceError::Authentication => WalletError::WrongPassword,
			other => WalletError::Persistence(other),
		}
	}
}
