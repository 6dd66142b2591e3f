use serde::{Deserialize, Serialize};

use crate::transaction::address::AccountAddress;
use crate::transaction::keys::{AccountKeys, PublicKey};

/// Managed addresses in creation order. Index 0 receives change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRegistry {
	accounts: Vec<AccountKeys>,
}

impl AddressRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_accounts(accounts: Vec<AccountKeys>) -> Self {
		Self { accounts }
	}

	pub fn create(&mut self) -> AccountAddress {
		let keys = AccountKeys::generate();
		let address = keys.address();
		self.accounts.push(keys);
		address
	}

	pub fn insert(&mut self, keys: AccountKeys) -> AccountAddress {
		let address = keys.address();
		self.accounts.push(keys);
		address
	}

	pub fn len(&self) -> usize {
		self.accounts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.accounts.is_empty()
	}

	pub fn get(&self, index: usize) -> Option<&AccountKeys> {
		self.accounts.get(index)
	}

	pub fn accounts(&self) -> &[AccountKeys] {
		&self.accounts
	}

	pub fn position(&self, address: &AccountAddress) -> Option<usize> {
		self.accounts.iter().position(|k| k.address() == *address)
	}

	/// Keys of the address whose spend public key is `owner`.
	pub fn keys_for(&self, owner: &PublicKey) -> Option<&AccountKeys> {
		self.accounts.iter().find(|k| k.spend_public == *owner)
	}

	pub fn contains_owner(&self, owner: &PublicKey) -> bool {
		self.keys_for(owner).is_some()
	}

	pub fn remove(&mut self, address: &AccountAddress) -> Option<AccountKeys> {
		let index = self.position(address)?;
		Some(self.accounts.remove(index))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_indices_follow_creation_order() {
		let mut registry = AddressRegistry::new();
		let first = registry.create();
		let second = registry.create();
		assert_eq!(registry.position(&first), Some(0));
		assert_eq!(registry.position(&second), Some(1));

		assert!(registry.remove(&first).is_some());
		assert_eq!(registry.position(&second), Some(0));
		assert!(!registry.contains_owner(&first.spend_public));
		assert!(registry.remove(&first).is_none());
	}
}
