//! Oldest-first output selection.

use itertools::Itertools;

use crate::node::OutputId;

/// An output that can fund a transaction.
pub trait Spendable {
	fn output_id(&self) -> OutputId;
	fn amount(&self) -> u64;
	/// Ordering key: inclusion height, then discovery order.
	fn age(&self) -> (u64, u64);
}

impl<T: Spendable + ?Sized> Spendable for &T {
	fn output_id(&self) -> OutputId {
		(**self).output_id()
	}

	fn amount(&self) -> u64 {
		(**self).amount()
	}

	fn age(&self) -> (u64, u64) {
		(**self).age()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Not enough spendable funds: required {required}, available {available}")]
pub struct SelectionError {
	pub required: u64,
	pub available: u64,
}

/// Picks the oldest outputs until their sum reaches `target`. Deterministic for a given set of
/// candidates.
pub fn select_oldest_first<T: Spendable>(candidates: &[T], target: u64) -> Result<Vec<&T>, SelectionError> {
	let mut selected = Vec::new();
	let mut collected = 0u64;

	for candidate in candidates.iter().sorted_by_key(|c| c.age()) {
		if collected >= target && !selected.is_empty() {
			break;
		}
		collected = collected.saturating_add(candidate.amount());
		selected.push(candidate);
	}

	if collected < target || selected.is_empty() {
		return Err(SelectionError {
			required: target,
			available: collected,
		});
	}
	Ok(selected)
}
