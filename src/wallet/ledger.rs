//!
//! Output ledger.
//!
//! Tracks every output paid to a managed address together with its spend state. Each mutation
//! returns the [`BalanceDelta`]s it caused so the balance aggregator can be kept in step without
//! rescanning the ledger.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::node::{Hash, OutputId};
use crate::transaction::keys::PublicKey;
use crate::transaction::selection::Spendable;
use crate::wallet::types::Balance;

/// Unlock times below this value are block heights, larger ones UNIX timestamps.
pub const MAX_BLOCK_NUMBER: u64 = 500_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendState {
	Unspent,
	/// Consumed by a wallet-built transaction not seen in a block yet
	Reserved { tx_hash: Hash },
	Spent { tx_hash: Hash, height: u64 },
}

/// What the wallet knows about the chain when classifying outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainView {
	pub top_height: Option<u64>,
	pub top_timestamp: u64,
	pub confirmation_depth: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletOutput {
	pub id: OutputId,
	/// Spend public key of the managed address owning the output
	pub owner: PublicKey,
	pub amount: u64,
	pub unlock_time: u64,
	/// Inclusion height, `None` while the creating transaction is unconfirmed
	pub height: Option<u64>,
	pub spend: SpendState,
	/// Discovery order, used to break ties between outputs of the same height
	pub sequence: u64,
}

impl WalletOutput {
	pub fn is_unlocked(&self, view: &ChainView) -> bool {
		let (Some(height), Some(top)) = (self.height, view.top_height) else {
			return false;
		};
		if top < height.saturating_add(view.confirmation_depth) {
			return false;
		}
		if self.unlock_time < MAX_BLOCK_NUMBER {
			top >= self.unlock_time
		} else {
			view.top_timestamp >= self.unlock_time
		}
	}

	/// The output's share of its owner's balance.
	pub fn contribution(&self, view: &ChainView) -> Balance {
		if self.spend != SpendState::Unspent {
			return Balance::default();
		}
		if self.is_unlocked(view) {
			Balance {
				actual: self.amount,
				pending: 0,
			}
		} else {
			Balance {
				actual: 0,
				pending: self.amount,
			}
		}
	}
}

impl Spendable for WalletOutput {
	fn output_id(&self) -> OutputId {
		self.id
	}

	fn amount(&self) -> u64 {
		self.amount
	}

	fn age(&self) -> (u64, u64) {
		(self.height.unwrap_or(u64::MAX), self.sequence)
	}
}

/// New output discovered in a block or created by the wallet's own transaction.
#[derive(Debug, Clone)]
pub struct OutputRecord {
	pub id: OutputId,
	pub owner: PublicKey,
	pub amount: u64,
	pub unlock_time: u64,
	pub height: Option<u64>,
}

/// Signed change of one owner's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
	pub owner: PublicKey,
	pub actual: i128,
	pub pending: i128,
}

impl BalanceDelta {
	fn between(owner: PublicKey, before: Balance, after: Balance) -> Option<Self> {
		if before == after {
			return None;
		}
		Some(Self {
			owner,
			actual: after.actual as i128 - before.actual as i128,
			pending: after.pending as i128 - before.pending as i128,
		})
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputLedger {
	outputs: HashMap<OutputId, WalletOutput>,
	next_sequence: u64,
	view: ChainView,
	/// Unspent outputs currently counted as pending
	locked: HashSet<OutputId>,
}

impl OutputLedger {
	pub fn new(confirmation_depth: u64) -> Self {
		Self {
			view: ChainView {
				confirmation_depth,
				..ChainView::default()
			},
			..Self::default()
		}
	}

	pub fn view(&self) -> &ChainView {
		&self.view
	}

	pub fn len(&self) -> usize {
		self.outputs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.outputs.is_empty()
	}

	pub fn get(&self, id: &OutputId) -> Option<&WalletOutput> {
		self.outputs.get(id)
	}

	pub fn outputs(&self) -> impl Iterator<Item = &WalletOutput> {
		self.outputs.values()
	}

	/// Records an output. Idempotent on the output identifier; recording a known unconfirmed
	/// output with a height confirms it in place.
	pub fn record_output(&mut self, record: OutputRecord) -> Vec<BalanceDelta> {
		if self.outputs.contains_key(&record.id) {
			let Some(height) = record.height else {
				return Vec::new();
			};
			return self
				.update(&record.id, |output| {
					if output.height.is_none() {
						output.height = Some(height);
					}
				})
				.into_iter()
				.collect();
		}

		let output = WalletOutput {
			id: record.id,
			owner: record.owner,
			amount: record.amount,
			unlock_time: record.unlock_time,
			height: record.height,
			spend: SpendState::Unspent,
			sequence: self.next_sequence,
		};
		self.next_sequence += 1;

		let after = output.contribution(&self.view);
		if after.pending > 0 {
			self.locked.insert(output.id);
		}
		self.outputs.insert(output.id, output);
		BalanceDelta::between(record.owner, Balance::default(), after)
			.into_iter()
			.collect()
	}

	/// Marks an output consumed by `tx_hash`, included at `height`. Unknown or already spent
	/// outputs are left alone.
	pub fn mark_spent(&mut self, id: &OutputId, tx_hash: Hash, height: u64) -> Vec<BalanceDelta> {
		match self.outputs.get(id).map(|o| o.spend) {
			None | Some(SpendState::Spent { .. }) => Vec::new(),
			Some(_) => self
				.update(id, |output| output.spend = SpendState::Spent { tx_hash, height })
				.into_iter()
				.collect(),
		}
	}

	/// Marks an output consumed by a wallet transaction that is not in a block yet.
	pub fn reserve(&mut self, id: &OutputId, tx_hash: Hash) -> Vec<BalanceDelta> {
		match self.outputs.get(id).map(|o| o.spend) {
			Some(SpendState::Unspent) => self
				.update(id, |output| output.spend = SpendState::Reserved { tx_hash })
				.into_iter()
				.collect(),
			_ => Vec::new(),
		}
	}

	/// Undoes a failed wallet transaction: its reservations are lifted and its unconfirmed
	/// outputs dropped.
	pub fn release(&mut self, tx_hash: &Hash) -> Vec<BalanceDelta> {
		let mut deltas = Vec::new();
		let reserved: Vec<OutputId> = self
			.outputs
			.values()
			.filter(|o| o.spend == SpendState::Reserved { tx_hash: *tx_hash })
			.map(|o| o.id)
			.collect();
		for id in reserved {
			deltas.extend(self.update(&id, |output| output.spend = SpendState::Unspent));
		}

		let created: Vec<OutputId> = self
			.outputs
			.values()
			.filter(|o| o.id.tx_hash == *tx_hash && o.height.is_none())
			.map(|o| o.id)
			.collect();
		for id in created {
			deltas.extend(self.remove(&id));
		}
		deltas
	}

	/// Forgets everything that happened above `height`. Outputs and spends of the wallet's own
	/// transactions in `local_pending` fall back to their unconfirmed form.
	pub fn revert_above(&mut self, height: u64, local_pending: &HashSet<Hash>) -> Vec<BalanceDelta> {
		let mut deltas = Vec::new();

		let detached: Vec<OutputId> = self
			.outputs
			.values()
			.filter(|o| o.height.is_some_and(|h| h > height))
			.map(|o| o.id)
			.collect();
		for id in detached {
			if local_pending.contains(&id.tx_hash) {
				deltas.extend(self.update(&id, |output| output.height = None));
			} else {
				deltas.extend(self.remove(&id));
			}
		}

		let unspent: Vec<(OutputId, Hash)> = self
			.outputs
			.values()
			.filter_map(|o| match o.spend {
				SpendState::Spent { tx_hash, height: h } if h > height => Some((o.id, tx_hash)),
				_ => None,
			})
			.collect();
		for (id, tx_hash) in unspent {
			let restored = if local_pending.contains(&tx_hash) {
				SpendState::Reserved { tx_hash }
			} else {
				SpendState::Unspent
			};
			deltas.extend(self.update(&id, |output| output.spend = restored));
		}
		deltas
	}

	/// Drops every output of `owner`.
	pub fn remove_owner(&mut self, owner: &PublicKey) -> Vec<BalanceDelta> {
		let owned: Vec<OutputId> = self
			.outputs
			.values()
			.filter(|o| o.owner == *owner)
			.map(|o| o.id)
			.collect();
		owned.iter().filter_map(|id| self.remove(id)).collect()
	}

	/// Moves the ledger to a new chain view, reclassifying outputs whose lock state changed.
	pub fn set_view(&mut self, view: ChainView) -> Vec<BalanceDelta> {
		let forward = view.confirmation_depth == self.view.confirmation_depth
			&& view.top_height >= self.view.top_height
			&& view.top_timestamp >= self.view.top_timestamp;
		let old = std::mem::replace(&mut self.view, view);

		let candidates: Vec<OutputId> = if forward {
			self.locked.iter().copied().collect()
		} else {
			self.outputs
				.values()
				.filter(|o| o.spend == SpendState::Unspent)
				.map(|o| o.id)
				.collect()
		};

		let mut deltas = Vec::new();
		for id in candidates {
			let Some(output) = self.outputs.get(&id) else {
				continue;
			};
			let owner = output.owner;
			let before = output.contribution(&old);
			let after = output.contribution(&self.view);
			self.track_lock(&id, after);
			deltas.extend(BalanceDelta::between(owner, before, after));
		}
		deltas
	}

	/// Spendable outputs of `owner` (or of every owner) worth at least `min_amount`, oldest
	/// first.
	pub fn unspent_outputs_for(&self, owner: Option<&PublicKey>, min_amount: u64) -> Vec<&WalletOutput> {
		self.outputs
			.values()
			.filter(|o| owner.is_none_or(|owner| o.owner == *owner))
			.filter(|o| o.amount >= min_amount && o.contribution(&self.view).actual > 0)
			.sorted_by_key(|o| o.age())
			.collect()
	}

	/// Balance of every owner computed from scratch.
	pub fn balances(&self) -> HashMap<PublicKey, Balance> {
		let mut balances: HashMap<PublicKey, Balance> = HashMap::new();
		for output in self.outputs.values() {
			let share = output.contribution(&self.view);
			let entry = balances.entry(output.owner).or_default();
			entry.actual += share.actual;
			entry.pending += share.pending;
		}
		balances
	}

	fn track_lock(&mut self, id: &OutputId, contribution: Balance) {
		if contribution.pending > 0 {
			self.locked.insert(*id);
		} else {
			self.locked.remove(id);
		}
	}

	fn update<F>(&mut self, id: &OutputId, apply: F) -> Option<BalanceDelta>
	where
		F: FnOnce(&mut WalletOutput),
	{
		let output = self.outputs.get_mut(id)?;
		let before = output.contribution(&self.view);
		apply(output);
		let after = output.contribution(&self.view);
		let owner = output.owner;
		self.track_lock(id, after);
		BalanceDelta::between(owner, before, after)
	}

	fn remove(&mut self, id: &OutputId) -> Option<BalanceDelta> {
		let output = self.outputs.remove(id)?;
		self.locked.remove(id);
		BalanceDelta::between(output.owner, output.contribution(&self.view), Balance::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn owner() -> PublicKey {
		PublicKey([1u8; 32])
	}

	fn output_id(n: u8) -> OutputId {
		OutputId {
			tx_hash: Hash([n; 32]),
			index: 0,
		}
	}

	fn record(n: u8, amount: u64, height: Option<u64>) -> OutputRecord {
		OutputRecord {
			id: output_id(n),
			owner: owner(),
			amount,
			unlock_time: 0,
			height,
		}
	}

	fn view(ledger: &OutputLedger, top: u64) -> ChainView {
		ChainView {
			top_height: Some(top),
			top_timestamp: 1_000 + top,
			confirmation_depth: ledger.view().confirmation_depth,
		}
	}

	fn sum(deltas: &[BalanceDelta]) -> (i128, i128) {
		deltas
			.iter()
			.fold((0, 0), |(a, p), d| (a + d.actual, p + d.pending))
	}

	#[test]
	fn test_record_output_is_idempotent() {
		let mut ledger = OutputLedger::new(10);
		ledger.set_view(view(&ledger, 5));
		assert_eq!(sum(&ledger.record_output(record(1, 100, Some(5)))), (0, 100));
		assert!(ledger.record_output(record(1, 100, Some(5))).is_empty());
		assert_eq!(ledger.len(), 1);
	}

	#[test]
	fn test_unconfirmed_output_confirms_in_place() {
		let mut ledger = OutputLedger::new(0);
		ledger.set_view(view(&ledger, 5));
		ledger.record_output(record(1, 100, None));
		let sequence = ledger.get(&output_id(1)).unwrap().sequence;

		assert_eq!(sum(&ledger.record_output(record(1, 100, Some(5)))), (100, -100));
		let output = ledger.get(&output_id(1)).unwrap();
		assert_eq!(output.height, Some(5));
		assert_eq!(output.sequence, sequence);
	}

	#[test]
	fn test_unlocks_after_confirmation_depth() {
		let mut ledger = OutputLedger::new(10);
		ledger.set_view(view(&ledger, 3));
		ledger.record_output(record(1, 100, Some(3)));
		assert!(ledger.set_view(view(&ledger, 12)).is_empty());
		assert_eq!(sum(&ledger.set_view(view(&ledger, 13))), (100, -100));
		assert_eq!(ledger.balances()[&owner()], Balance { actual: 100, pending: 0 });

		// rewinding the view locks it again
		assert_eq!(sum(&ledger.set_view(view(&ledger, 12))), (-100, 100));
	}

	#[test]
	fn test_unlock_time_as_timestamp() {
		let mut ledger = OutputLedger::new(0);
		ledger.set_view(view(&ledger, 1));
		let mut timed = record(1, 50, Some(1));
		timed.unlock_time = MAX_BLOCK_NUMBER + 10;
		ledger.record_output(timed);
		assert_eq!(ledger.balances()[&owner()].pending, 50);

		let mut later = view(&ledger, 2);
		later.top_timestamp = MAX_BLOCK_NUMBER + 10;
		ledger.set_view(later);
		assert_eq!(ledger.balances()[&owner()].actual, 50);
	}

	#[test]
	fn test_mark_spent_twice_is_noop() {
		let mut ledger = OutputLedger::new(0);
		ledger.set_view(view(&ledger, 5));
		ledger.record_output(record(1, 100, Some(1)));
		let spender = Hash([9u8; 32]);
		assert_eq!(sum(&ledger.mark_spent(&output_id(1), spender, 6)), (-100, 0));
		assert!(ledger.mark_spent(&output_id(1), Hash([8u8; 32]), 7).is_empty());
		assert_eq!(
			ledger.get(&output_id(1)).unwrap().spend,
			SpendState::Spent {
				tx_hash: spender,
				height: 6
			}
		);
	}

	#[test]
	fn test_release_restores_reserved_and_drops_change() {
		let mut ledger = OutputLedger::new(0);
		ledger.set_view(view(&ledger, 5));
		ledger.record_output(record(1, 100, Some(1)));
		let tx_hash = Hash([7u8; 32]);
		ledger.reserve(&output_id(1), tx_hash);
		ledger.record_output(record(7, 40, None));
		assert_eq!(ledger.balances()[&owner()], Balance { actual: 0, pending: 40 });

		assert_eq!(sum(&ledger.release(&tx_hash)), (100, -40));
		assert_eq!(ledger.len(), 1);
		assert_eq!(ledger.get(&output_id(1)).unwrap().spend, SpendState::Unspent);
	}

	#[test]
	fn test_revert_above_keeps_local_pending() {
		let mut ledger = OutputLedger::new(0);
		ledger.set_view(view(&ledger, 10));
		ledger.record_output(record(1, 100, Some(2)));
		ledger.record_output(record(2, 30, Some(8)));
		let own = Hash([3u8; 32]);
		ledger.record_output(record(3, 60, Some(9)));
		ledger.mark_spent(&output_id(1), own, 9);

		let local: HashSet<Hash> = [own].into_iter().collect();
		ledger.revert_above(7, &local);

		assert!(ledger.get(&output_id(2)).is_none());
		assert_eq!(ledger.get(&output_id(3)).unwrap().height, None);
		assert_eq!(
			ledger.get(&output_id(1)).unwrap().spend,
			SpendState::Reserved { tx_hash: own }
		);

		ledger.revert_above(1, &HashSet::new());
		assert!(ledger.get(&output_id(3)).is_some());
		assert!(ledger.get(&output_id(1)).is_none());
	}

	#[test]
	fn test_unspent_outputs_oldest_first() {
		let mut ledger = OutputLedger::new(0);
		ledger.set_view(view(&ledger, 10));
		ledger.record_output(record(1, 10, Some(5)));
		ledger.record_output(record(2, 20, Some(3)));
		ledger.record_output(record(3, 30, Some(3)));
		ledger.record_output(record(4, 5, None));

		let amounts: Vec<u64> = ledger
			.unspent_outputs_for(None, 0)
			.iter()
			.map(|o| o.amount)
			.collect();
		assert_eq!(amounts, vec![20, 30, 10]);
		assert_eq!(ledger.unspent_outputs_for(Some(&owner()), 15).len(), 2);
		assert!(ledger.unspent_outputs_for(Some(&PublicKey([2u8; 32])), 0).is_empty());
	}
}
