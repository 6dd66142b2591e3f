use tracing::{debug, trace, warn};

use crate::node::{Block, OutputId, Transaction, TransactionInput};
use crate::transaction::COIN_DECIMALS;
use crate::transaction::keys::PublicKey;
use crate::utils::format_signed_amount;
use crate::wallet::events::{EventNotifier, WalletEvent};
use crate::wallet::ledger::{BalanceDelta, OutputRecord};
use crate::wallet::state::WalletState;
use crate::wallet::types::{TransactionState, WalletTransaction, WalletTransfer};

/// Applies blocks to the wallet state.
#[derive(Debug, Clone)]
pub struct BlockProcessor {
	confirmation_depth: u64,
}

impl BlockProcessor {
	pub fn new(confirmation_depth: u64) -> Self {
		Self { confirmation_depth }
	}

	/// Applies `block` on top of the wallet's chain. Returns how many of its transactions touch
	/// the wallet.
	pub fn apply_block(&self, state: &mut WalletState, block: &Block, events: &mut EventNotifier) -> usize {
		let mut deltas = Vec::new();
		let mut relevant = 0;
		for transaction in &block.transactions {
			if self.process_transaction(state, block, transaction, &mut deltas, events) {
				relevant += 1;
			}
		}

		state.chain.push(block.hash, block.timestamp);
		deltas.extend(
			state
				.ledger
				.set_view(state.chain.view(self.confirmation_depth)),
		);
		if state.balances.apply(&deltas) {
			events.push(WalletEvent::BalanceUpdated);
		}

		debug!(
			"Applied block {} at height {} ({} wallet transactions)",
			block.hash, block.height, relevant
		);
		relevant
	}

	fn process_transaction(
		&self,
		state: &mut WalletState,
		block: &Block,
		transaction: &Transaction,
		deltas: &mut Vec<BalanceDelta>,
		events: &mut EventNotifier,
	) -> bool {
		let tx_hash = transaction.hash();
		// net amount per managed address, in order of first appearance
		let mut net: Vec<(PublicKey, i128)> = Vec::new();
		let mut credit = |owner: PublicKey, amount: i128| match net.iter_mut().find(|(o, _)| *o == owner) {
			Some((_, total)) => *total += amount,
			None => net.push((owner, amount)),
		};

		for (index, output) in transaction.outputs.iter().enumerate() {
			if !state.addresses.contains_owner(&output.key) {
				continue;
			}
			deltas.extend(state.ledger.record_output(OutputRecord {
				id: OutputId {
					tx_hash,
					index: index as u32,
				},
				owner: output.key,
				amount: output.amount,
				unlock_time: transaction.unlock_time,
				height: Some(block.height),
			}));
			credit(output.key, output.amount as i128);
		}

		for input in &transaction.inputs {
			let TransactionInput::Key { output_id, .. } = input else {
				continue;
			};
			let Some(spent) = state.ledger.get(output_id) else {
				continue;
			};
			let (owner, amount) = (spent.owner, spent.amount);
			deltas.extend(state.ledger.mark_spent(output_id, tx_hash, block.height));
			credit(owner, -(amount as i128));
		}

		let incoming: Vec<WalletTransfer> = net
			.iter()
			.filter(|(_, amount)| *amount > 0)
			.filter_map(|(owner, amount)| {
				let keys = state.addresses.keys_for(owner)?;
				Some(WalletTransfer {
					address: keys.address().encode(),
					amount: *amount as i64,
				})
			})
			.collect();

		let cache = &mut state.transactions;
		if let Some(index) = cache.index_of(&tx_hash) {
			let changed = match cache.confirm(index, block.height, block.timestamp, incoming) {
				Ok(changed) => changed,
				Err(error) => {
					warn!("Failed to confirm transaction {}: {}", tx_hash, error);
					return !net.is_empty();
				}
			};
			if changed {
				trace!("Transaction {} confirmed at height {}", tx_hash, block.height);
				events.push(WalletEvent::TransactionUpdated {
					transaction_index: index,
				});
			}
			return true;
		}

		if net.is_empty() {
			return false;
		}

		let total: i128 = net.iter().map(|(_, amount)| amount).sum();
		let input_amount = transaction.input_amount();
		let fee = if input_amount > 0 {
			input_amount.saturating_sub(transaction.output_amount())
		} else {
			0
		};
		let record = WalletTransaction {
			state: TransactionState::Succeeded,
			timestamp: block.timestamp,
			block_height: block.height,
			hash: tx_hash,
			total_amount: total as i64,
			fee,
			creation_time: block.timestamp,
			unlock_time: transaction.unlock_time,
			extra: transaction.extra.clone(),
		};
		debug!(
			"Discovered transaction {} at height {} ({})",
			tx_hash,
			block.height,
			format_signed_amount(total as i64, COIN_DECIMALS)
		);
		let (index, _) = cache.find_or_create_by_hash(&tx_hash, || (record, incoming));
		events.push(WalletEvent::TransactionCreated {
			transaction_index: index,
		});
		true
	}
}
