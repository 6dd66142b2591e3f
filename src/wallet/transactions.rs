//!
//! Transaction cache.
//!
//! Ordered record of every transaction the wallet has seen or sent. The index of a record is its
//! stable handle: records are never removed, a reorganization only changes their state, and a
//! transaction delivered again after a reorganization reuses its original slot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::node::Hash;
use crate::transaction::UNCONFIRMED_TRANSACTION_HEIGHT;
use crate::wallet::types::{TransactionState, WalletError, WalletTransaction, WalletTransfer};

/// Who created a cached transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOrigin {
	/// Built and relayed by this wallet
	Local,
	/// Discovered in a block
	External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CacheEntry {
	transaction: WalletTransaction,
	transfers: Vec<WalletTransfer>,
	origin: TransactionOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCache {
	entries: Vec<CacheEntry>,
	by_hash: HashMap<Hash, usize>,
}

impl TransactionCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn append(
		&mut self,
		transaction: WalletTransaction,
		transfers: Vec<WalletTransfer>,
		origin: TransactionOrigin,
	) -> usize {
		let index = self.entries.len();
		self.by_hash.insert(transaction.hash, index);
		self.entries.push(CacheEntry {
			transaction,
			transfers,
			origin,
		});
		index
	}

	pub fn index_of(&self, hash: &Hash) -> Option<usize> {
		self.by_hash.get(hash).copied()
	}

	/// Returns the index of the record for `hash`, appending the record built by `make` if there
	/// is none. The flag tells whether a record was created.
	pub fn find_or_create_by_hash<F>(&mut self, hash: &Hash, make: F) -> (usize, bool)
	where
		F: FnOnce() -> (WalletTransaction, Vec<WalletTransfer>),
	{
		if let Some(index) = self.index_of(hash) {
			return (index, false);
		}
		let (transaction, transfers) = make();
		(
			self.append(transaction, transfers, TransactionOrigin::External),
			true,
		)
	}

	pub fn get(&self, index: usize) -> Result<&WalletTransaction, WalletError> {
		self.entry(index).map(|e| &e.transaction)
	}

	pub fn get_mut(&mut self, index: usize) -> Result<&mut WalletTransaction, WalletError> {
		let count = self.entries.len();
		self.entries
			.get_mut(index)
			.map(|e| &mut e.transaction)
			.ok_or(WalletError::IndexOutOfRange { index, count })
	}

	pub fn origin(&self, index: usize) -> Result<TransactionOrigin, WalletError> {
		self.entry(index).map(|e| e.origin)
	}

	pub fn transfers(&self, index: usize) -> Result<&[WalletTransfer], WalletError> {
		self.entry(index).map(|e| e.transfers.as_slice())
	}

	pub fn transfer(&self, index: usize, transfer_index: usize) -> Result<&WalletTransfer, WalletError> {
		let transfers = self.transfers(index)?;
		transfers
			.get(transfer_index)
			.ok_or(WalletError::IndexOutOfRange {
				index: transfer_index,
				count: transfers.len(),
			})
	}

	/// Records the inclusion of a known transaction in a block. A discovered record that a
	/// reorganization deleted takes `transfers` back. Returns whether the record changed.
	pub fn confirm(
		&mut self,
		index: usize,
		block_height: u64,
		timestamp: u64,
		transfers: Vec<WalletTransfer>,
	) -> Result<bool, WalletError> {
		let count = self.entries.len();
		let entry = self
			.entries
			.get_mut(index)
			.ok_or(WalletError::IndexOutOfRange { index, count })?;
		let before = entry.transaction.clone();
		let transaction = &mut entry.transaction;
		if transaction.state == TransactionState::Deleted && entry.origin == TransactionOrigin::External {
			entry.transfers = transfers;
		}
		transaction.block_height = block_height;
		transaction.timestamp = timestamp;
		transaction.state = TransactionState::Succeeded;
		Ok(*transaction != before)
	}

	pub fn update_state(&mut self, index: usize, state: TransactionState) -> Result<bool, WalletError> {
		let transaction = self.get_mut(index)?;
		let changed = transaction.state != state;
		transaction.state = state;
		Ok(changed)
	}

	/// Hashes of the wallet's own transactions that are still expected to reach a block.
	pub fn local_pending_hashes(&self) -> impl Iterator<Item = Hash> + '_ {
		self.entries
			.iter()
			.filter(|e| {
				e.origin == TransactionOrigin::Local
					&& matches!(
						e.transaction.state,
						TransactionState::Created | TransactionState::Succeeded
					)
			})
			.map(|e| e.transaction.hash)
	}

	/// Smallest index of a record included above `height`.
	pub fn first_index_above(&self, height: u64) -> Option<usize> {
		self.entries.iter().position(|e| is_included_above(&e.transaction, height))
	}

	/// Invalidates the records at or after `index` that were included above `height`.
	/// Discovered records become `Deleted`, the wallet's own records unconfirmed. Returns the
	/// indices that changed.
	pub fn remove_from(&mut self, index: usize, height: u64) -> Vec<usize> {
		let mut changed = Vec::new();
		for (position, entry) in self.entries.iter_mut().enumerate().skip(index) {
			if !is_included_above(&entry.transaction, height) {
				continue;
			}
			let transaction = &mut entry.transaction;
			transaction.block_height = UNCONFIRMED_TRANSACTION_HEIGHT;
			transaction.timestamp = 0;
			if entry.origin == TransactionOrigin::External {
				transaction.state = TransactionState::Deleted;
				entry.transfers.clear();
			}
			changed.push(position);
		}
		changed
	}

	fn entry(&self, index: usize) -> Result<&CacheEntry, WalletError> {
		self.entries.get(index).ok_or(WalletError::IndexOutOfRange {
			index,
			count: self.entries.len(),
		})
	}
}

fn is_included_above(transaction: &WalletTransaction, height: u64) -> bool {
	transaction.block_height != UNCONFIRMED_TRANSACTION_HEIGHT
		&& transaction.block_height > height
		&& transaction.state != TransactionState::Deleted
}

#[cfg(test)]
mod tests {
	use super::*;

	fn transaction(n: u8, height: u64) -> WalletTransaction {
		WalletTransaction {
			state: TransactionState::Succeeded,
			timestamp: 100,
			block_height: height,
			hash: Hash([n; 32]),
			total_amount: 10,
			fee: 0,
			creation_time: 100,
			unlock_time: 0,
			extra: Vec::new(),
		}
	}

	fn transfer(amount: i64) -> Vec<WalletTransfer> {
		vec![WalletTransfer {
			address: "wsync1xyz".to_string(),
			amount,
		}]
	}

	#[test]
	fn test_find_or_create_reuses_slot() {
		let mut cache = TransactionCache::new();
		let (index, created) =
			cache.find_or_create_by_hash(&Hash([1; 32]), || (transaction(1, 4), transfer(10)));
		assert_eq!((index, created), (0, true));
		let (again, created) = cache.find_or_create_by_hash(&Hash([1; 32]), || unreachable!());
		assert_eq!((again, created), (0, false));
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn test_out_of_range() {
		let cache = TransactionCache::new();
		assert!(matches!(
			cache.get(0),
			Err(WalletError::IndexOutOfRange { index: 0, count: 0 })
		));
		assert!(cache.transfer(3, 0).is_err());
	}

	#[test]
	fn test_remove_from_invalidates_above_height() {
		let mut cache = TransactionCache::new();
		let mut own = transaction(1, 9);
		own.total_amount = -50;
		cache.append(own, transfer(-40), TransactionOrigin::Local);
		cache.append(transaction(2, 3), transfer(10), TransactionOrigin::External);
		cache.append(transaction(3, 8), transfer(10), TransactionOrigin::External);

		let first = cache.first_index_above(5).unwrap();
		assert_eq!(first, 0);
		assert_eq!(cache.remove_from(first, 5), vec![0, 2]);

		let own = cache.get(0).unwrap();
		assert_eq!(own.state, TransactionState::Succeeded);
		assert_eq!(own.block_height, UNCONFIRMED_TRANSACTION_HEIGHT);
		assert_eq!(cache.transfers(0).unwrap().len(), 1);

		assert_eq!(cache.get(1).unwrap().block_height, 3);
		assert_eq!(cache.get(2).unwrap().state, TransactionState::Deleted);
		assert!(cache.transfers(2).unwrap().is_empty());
		assert_eq!(cache.index_of(&Hash([3; 32])), Some(2));

		assert_eq!(
			cache.local_pending_hashes().collect::<Vec<_>>(),
			vec![Hash([1; 32])]
		);
	}

	#[test]
	fn test_confirm_revives_deleted_record() {
		let mut cache = TransactionCache::new();
		cache.append(transaction(1, 8), transfer(10), TransactionOrigin::External);
		cache.remove_from(0, 5);
		assert!(cache.transfers(0).unwrap().is_empty());

		assert!(cache.confirm(0, 6, 160, transfer(10)).unwrap());
		let revived = cache.get(0).unwrap();
		assert_eq!(revived.state, TransactionState::Succeeded);
		assert_eq!((revived.block_height, revived.timestamp), (6, 160));
		assert_eq!(cache.transfers(0).unwrap(), transfer(10).as_slice());

		// already confirmed at the same place
		assert!(!cache.confirm(0, 6, 160, transfer(99)).unwrap());
		assert_eq!(cache.transfers(0).unwrap(), transfer(10).as_slice());
	}

	#[test]
	fn test_confirm_keeps_local_transfers() {
		let mut cache = TransactionCache::new();
		let mut own = transaction(1, UNCONFIRMED_TRANSACTION_HEIGHT);
		own.total_amount = -50;
		cache.append(own, transfer(-40), TransactionOrigin::Local);

		assert!(cache.confirm(0, 4, 140, Vec::new()).unwrap());
		assert_eq!(cache.get(0).unwrap().block_height, 4);
		assert_eq!(cache.transfers(0).unwrap(), transfer(-40).as_slice());
		assert!(matches!(
			cache.confirm(1, 4, 140, Vec::new()),
			Err(WalletError::IndexOutOfRange { index: 1, count: 1 })
		));
	}
}
