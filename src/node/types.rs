//! Types exchanged with the blockchain node.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::keys::{PublicKey, Signature};

/// 32-byte BLAKE3 digest identifying blocks and transactions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
	pub fn digest(data: &[u8]) -> Self {
		Self(*blake3::hash(data).as_bytes())
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Hash({})", hex::encode(self.0))
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&hex::encode(self.0))
	}
}

/// Global identifier of an output: the creating transaction and the output position in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId {
	pub tx_hash: Hash,
	pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionInput {
	/// Block reward input, only valid as the single input of a block's first transaction.
	Coinbase { height: u64 },
	/// Spends `output_id`; `decoys` are the other ring members hiding it.
	Key {
		amount: u64,
		output_id: OutputId,
		decoys: Vec<OutputId>,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
	pub amount: u64,
	pub key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub version: u8,
	pub unlock_time: u64,
	pub inputs: Vec<TransactionInput>,
	pub outputs: Vec<TransactionOutput>,
	pub extra: Vec<u8>,
	pub signatures: Vec<Vec<Signature>>,
}

#[derive(Serialize)]
struct TransactionPrefix<'a> {
	version: u8,
	unlock_time: u64,
	inputs: &'a [TransactionInput],
	outputs: &'a [TransactionOutput],
	extra: &'a [u8],
}

impl Transaction {
	/// Hash of everything except the signatures.
	pub fn prefix_hash(&self) -> Hash {
		let prefix = TransactionPrefix {
			version: self.version,
			unlock_time: self.unlock_time,
			inputs: &self.inputs,
			outputs: &self.outputs,
			extra: &self.extra,
		};
		Hash::digest(&bincode::serialize(&prefix).unwrap_or_default())
	}

	pub fn hash(&self) -> Hash {
		Hash::digest(&self.to_blob())
	}

	/// Serialized form relayed to the node.
	pub fn to_blob(&self) -> Vec<u8> {
		bincode::serialize(self).unwrap_or_default()
	}

	pub fn is_coinbase(&self) -> bool {
		matches!(self.inputs.as_slice(), [TransactionInput::Coinbase { .. }])
	}

	/// Sum of the amounts carried by key inputs.
	pub fn input_amount(&self) -> u64 {
		self.inputs
			.iter()
			.map(|input| match input {
				TransactionInput::Key { amount, .. } => *amount,
				TransactionInput::Coinbase { .. } => 0,
			})
			.fold(0u64, |acc, amount| acc.saturating_add(amount))
	}

	pub fn output_amount(&self) -> u64 {
		self.outputs
			.iter()
			.fold(0u64, |acc, output| acc.saturating_add(output.amount))
	}

	pub fn output_id(&self, index: u32) -> OutputId {
		OutputId {
			tx_hash: self.hash(),
			index,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
	pub height: u64,
	pub hash: Hash,
	pub prev_hash: Hash,
	/// UNIX seconds.
	pub timestamp: u64,
	/// The first transaction is the coinbase.
	pub transactions: Vec<Transaction>,
}

impl Block {
	pub fn compute_hash(height: u64, prev_hash: &Hash, timestamp: u64, transactions: &[Transaction]) -> Hash {
		let mut hasher = blake3::Hasher::new();
		hasher.update(&height.to_le_bytes());
		hasher.update(&prev_hash.0);
		hasher.update(&timestamp.to_le_bytes());
		for tx in transactions {
			hasher.update(&tx.hash().0);
		}
		Hash(*hasher.finalize().as_bytes())
	}
}

/// Notifications delivered by the node to subscribed wallets, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeNotification {
	/// The node's chain now ends at `top_height`.
	ChainUpdated { top_height: u64 },
	/// Every block above `height` was replaced.
	ChainDetached { height: u64 },
	/// The transaction pool changed; carries no chain data.
	PoolUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
	#[error("Transaction rejected: {0}")]
	TransactionRejected(String),

	#[error("Transaction spends an output that is already spent: {0:?}")]
	DoubleSpend(OutputId),

	#[error("Block {0} is not available")]
	BlockNotFound(u64),

	#[error("Not enough outputs for mixin: requested {requested}, available {available}")]
	NotEnoughOutputs { requested: usize, available: usize },

	#[error("Node unavailable: {0}")]
	Unavailable(String),
}
