//! Running per-address and aggregate balances.

use std::collections::HashMap;

use crate::transaction::keys::PublicKey;
use crate::wallet::ledger::{BalanceDelta, OutputLedger};
use crate::wallet::types::Balance;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceAggregator {
	per_owner: HashMap<PublicKey, Balance>,
	total: Balance,
}

fn shift(value: u64, delta: i128) -> u64 {
	(value as i128 + delta).clamp(0, u64::MAX as i128) as u64
}

impl BalanceAggregator {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn total(&self) -> Balance {
		self.total
	}

	pub fn balance_of(&self, owner: &PublicKey) -> Balance {
		self.per_owner.get(owner).copied().unwrap_or_default()
	}

	/// Applies ledger deltas. Returns whether any balance changed.
	pub fn apply(&mut self, deltas: &[BalanceDelta]) -> bool {
		let mut changed = false;
		for delta in deltas {
			if delta.actual == 0 && delta.pending == 0 {
				continue;
			}
			let entry = self.per_owner.entry(delta.owner).or_default();
			entry.actual = shift(entry.actual, delta.actual);
			entry.pending = shift(entry.pending, delta.pending);
			self.total.actual = shift(self.total.actual, delta.actual);
			self.total.pending = shift(self.total.pending, delta.pending);
			changed = true;
		}
		self.per_owner.retain(|_, b| *b != Balance::default());
		changed
	}

	/// Rebuilds every sum from the ledger. Returns whether the result differs from the running
	/// sums.
	pub fn recompute(&mut self, ledger: &OutputLedger) -> bool {
		let mut per_owner = ledger.balances();
		per_owner.retain(|_, b| *b != Balance::default());
		let total = per_owner.values().fold(Balance::default(), |acc, b| Balance {
			actual: acc.actual + b.actual,
			pending: acc.pending + b.pending,
		});

		let changed = total != self.total || per_owner != self.per_owner;
		self.per_owner = per_owner;
		self.total = total;
		changed
	}
}
