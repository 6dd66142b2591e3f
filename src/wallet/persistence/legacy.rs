//! Legacy single-account wallet format.
//!
//! ```text
//! magic "WLEG" | version u32le | salt [16] | nonce [24] | ciphertext
//! ```
//!
//! The body holds one account, an optional details section with the legacy transaction records
//! and their transfers, and an opaque cache blob. The cache cannot be interpreted by the current
//! wallet, so an imported wallet starts with an empty ledger and resynchronizes.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::*;
use crate::node::Hash;
use crate::transaction::UNCONFIRMED_TRANSACTION_HEIGHT;
use crate::wallet::transactions::TransactionOrigin;
use crate::wallet::types::{TransactionState, WalletTransaction, WalletTransfer};

pub const MAGIC: &[u8; 4] = b"WLEG";
pub const VERSION: u32 = 1;

/// The legacy format has no room for KDF parameters in its header.
pub const LEGACY_KDF: KdfConfig = KdfConfig {
	mem_kib: 4096,
	time_cost: 1,
};

const HEADER_LEN: usize = 4 + 4 + SALT_LEN + NONCE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyDirection {
	/// Sent by the wallet; `total_amount` is the positive amount that left it
	Outgoing,
	/// Found in a block; amounts are the sums over the transaction's inputs and outputs
	Incoming { amount_in: u64, amount_out: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTransaction {
	pub direction: LegacyDirection,
	/// Index of the first transfer in [`LegacyDetails::transfers`]
	pub first_transfer_id: Option<usize>,
	pub transfer_count: usize,
	pub total_amount: i64,
	pub fee: u64,
	pub sent_time: u64,
	pub unlock_time: u64,
	pub hash: Hash,
	pub is_coinbase: bool,
	pub block_height: u64,
	pub timestamp: u64,
	pub extra: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyDetails {
	pub transactions: Vec<LegacyTransaction>,
	pub transfers: Vec<WalletTransfer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyWallet {
	pub account: AccountKeys,
	pub details: Option<LegacyDetails>,
	pub cache: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

impl LegacyCodec {
	pub fn encode_wallet(&self, wallet: &LegacyWallet, password: &str) -> Result<Vec<u8>, PersistenceError> {
		let salt: [u8; SALT_LEN] = random_bytes();
		let nonce: [u8; NONCE_LEN] = random_bytes();

		let mut header = Vec::with_capacity(HEADER_LEN);
		header.extend_from_slice(MAGIC);
		header.extend_from_slice(&VERSION.to_le_bytes());
		header.extend_from_slice(&salt);
		header.extend_from_slice(&nonce);

		let body =
			bincode::serialize(wallet).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
		let key = derive_key(password, &salt, LEGACY_KDF)?;
		let ciphertext = seal(&key, &nonce, &body, &header)?;
		header.extend_from_slice(&ciphertext);
		Ok(header)
	}

	pub fn decode_wallet(&self, data: &[u8], password: &str) -> Result<LegacyWallet, PersistenceError> {
		if data.len() < HEADER_LEN {
			return Err(PersistenceError::InvalidFormat(
				"legacy wallet is shorter than its header".to_string(),
			));
		}
		let (header, ciphertext) = data.split_at(HEADER_LEN);
		if &header[..4] != MAGIC {
			return Err(PersistenceError::InvalidFormat(
				"missing legacy wallet signature".to_string(),
			));
		}
		let mut version = [0u8; 4];
		version.copy_from_slice(&header[4..8]);
		let version = u32::from_le_bytes(version);
		if version != VERSION {
			return Err(PersistenceError::UnsupportedVersion(version));
		}

		let salt = &header[8..8 + SALT_LEN];
		let nonce = &header[8 + SALT_LEN..HEADER_LEN];
		let key = derive_key(password, salt, LEGACY_KDF)?;
		let body = open(&key, nonce, ciphertext, header)?;
		bincode::deserialize(&body).map_err(|e| PersistenceError::Serialization(e.to_string()))
	}
}

fn import_details(details: LegacyDetails) -> Result<TransactionCache, PersistenceError> {
	let mut cache = TransactionCache::new();
	for legacy in details.transactions {
		let transfers = match legacy.first_transfer_id {
			Some(first) if legacy.transfer_count > 0 => first
				.checked_add(legacy.transfer_count)
				.and_then(|end| details.transfers.get(first..end))
				.ok_or_else(|| {
					PersistenceError::InvalidFormat(format!(
						"{} transfers from {} of legacy transaction {} are missing",
						legacy.transfer_count, first, legacy.hash
					))
				})?
				.to_vec(),
			_ => Vec::new(),
		};

		match legacy.direction {
			LegacyDirection::Outgoing => {
				let transaction = WalletTransaction {
					state: TransactionState::Succeeded,
					timestamp: 0,
					block_height: UNCONFIRMED_TRANSACTION_HEIGHT,
					hash: legacy.hash,
					total_amount: legacy.total_amount.saturating_neg(),
					fee: legacy.fee,
					creation_time: legacy.sent_time,
					unlock_time: legacy.unlock_time,
					extra: legacy.extra,
				};
				cache.append(transaction, transfers, TransactionOrigin::Local);
			}
			LegacyDirection::Incoming {
				amount_in,
				amount_out,
			} => {
				let transaction = WalletTransaction {
					state: TransactionState::Succeeded,
					timestamp: legacy.timestamp,
					block_height: legacy.block_height,
					hash: legacy.hash,
					total_amount: legacy.total_amount,
					fee: if amount_in > 0 {
						amount_in.saturating_sub(amount_out)
					} else {
						0
					},
					creation_time: 0,
					unlock_time: legacy.unlock_time,
					extra: legacy.extra,
				};
				cache.append(transaction, transfers, TransactionOrigin::External);
			}
		}
	}
	Ok(cache)
}

fn export_details(cache: &TransactionCache) -> Result<LegacyDetails, PersistenceError> {
	let mut details = LegacyDetails::default();
	for index in 0..cache.len() {
		let transaction = cache.get(index).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
		let transfers = cache
			.transfers(index)
			.map_err(|e| PersistenceError::Serialization(e.to_string()))?;
		let first_transfer_id = (!transfers.is_empty()).then_some(details.transfers.len());
		details.transfers.extend_from_slice(transfers);

		let outgoing = cache.origin(index).ok() == Some(TransactionOrigin::Local);
		details.transactions.push(LegacyTransaction {
			direction: if outgoing {
				LegacyDirection::Outgoing
			} else {
				LegacyDirection::Incoming {
					amount_in: 0,
					amount_out: 0,
				}
			},
			first_transfer_id,
			transfer_count: transfers.len(),
			total_amount: if outgoing {
				transaction.total_amount.saturating_neg()
			} else {
				transaction.total_amount
			},
			fee: transaction.fee,
			sent_time: transaction.creation_time,
			unlock_time: transaction.unlock_time,
			hash: transaction.hash,
			is_coinbase: false,
			block_height: transaction.block_height,
			timestamp: transaction.timestamp,
			extra: transaction.extra.clone(),
		});
	}
	Ok(details)
}

impl WalletStateCodec for LegacyCodec {
	/// Writes the first account and, when present, the transaction details.
	fn encode(&self, snapshot: &WalletSnapshot, password: &str) -> Result<Vec<u8>, PersistenceError> {
		let account = snapshot.accounts.first().cloned().ok_or_else(|| {
			PersistenceError::InvalidFormat("legacy wallets need exactly one account".to_string())
		})?;
		let details = snapshot.details.as_ref().map(export_details).transpose()?;
		self.encode_wallet(
			&LegacyWallet {
				account,
				details,
				cache: Vec::new(),
			},
			password,
		)
	}

	fn decode(&self, data: &[u8], password: &str) -> Result<WalletSnapshot, PersistenceError> {
		let wallet = self.decode_wallet(data, password)?;
		debug!(
			"Legacy wallet carries {} bytes of cache that will be rebuilt by synchronization",
			wallet.cache.len()
		);
		let details = wallet.details.map(import_details).transpose()?;
		info!(
			"Imported legacy wallet with {} transactions",
			details.as_ref().map_or(0, |d| d.len())
		);
		Ok(WalletSnapshot {
			accounts: vec![wallet.account],
			cache: None,
			details,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn outgoing() -> LegacyTransaction {
		LegacyTransaction {
			direction: LegacyDirection::Outgoing,
			first_transfer_id: Some(0),
			transfer_count: 2,
			total_amount: 1_234_567_890,
			fee: 1000,
			sent_time: 0,
			unlock_time: 12,
			hash: Hash([4; 32]),
			is_coinbase: false,
			block_height: UNCONFIRMED_TRANSACTION_HEIGHT,
			timestamp: 8_899_007_711,
			extra: b"jsjeokvsnxcvkhdoifjaslkcvnvuergeonlsdnlaksmdclkasowehunkjn".to_vec(),
		}
	}

	fn incoming(amount_in: u64) -> LegacyTransaction {
		LegacyTransaction {
			direction: LegacyDirection::Incoming {
				amount_in,
				amount_out: 948_578,
			},
			first_transfer_id: None,
			transfer_count: 0,
			total_amount: 99_874_442,
			fee: 0,
			sent_time: 0,
			unlock_time: 17,
			hash: Hash([125; 32]),
			is_coinbase: false,
			block_height: 2349,
			timestamp: 929_453,
			extra: vec![1, 2, 3, 4, 5, 6, 7, 8, 9],
		}
	}

	fn legacy_wallet() -> LegacyWallet {
		LegacyWallet {
			account: AccountKeys::generate(),
			details: Some(LegacyDetails {
				transactions: vec![outgoing(), incoming(1_200_353)],
				transfers: vec![
					WalletTransfer {
						address: "wsync1destination".to_string(),
						amount: 1_000_000,
					},
					WalletTransfer {
						address: "wsync1second".to_string(),
						amount: 102_034,
					},
				],
			}),
			cache: vec![b'c'; 1024],
		}
	}

	#[test]
	fn test_import_details() {
		let wallet = legacy_wallet();
		let encoded = LegacyCodec.encode_wallet(&wallet, "pass").unwrap();
		assert_eq!(&encoded[..4], b"WLEG");

		let snapshot = LegacyCodec.decode(&encoded, "pass").unwrap();
		assert_eq!(snapshot.accounts, vec![wallet.account.clone()]);
		assert!(snapshot.cache.is_none());

		let cache = snapshot.details.unwrap();
		assert_eq!(cache.len(), 2);

		let sent = cache.get(0).unwrap();
		assert_eq!(sent.state, TransactionState::Succeeded);
		assert_eq!(sent.block_height, UNCONFIRMED_TRANSACTION_HEIGHT);
		assert_eq!(sent.total_amount, -1_234_567_890);
		assert_eq!(sent.fee, 1000);
		assert_eq!(sent.unlock_time, 12);
		assert_eq!(cache.transfers(0).unwrap(), &wallet.details.as_ref().unwrap().transfers[..]);

		let received = cache.get(1).unwrap();
		assert_eq!(received.block_height, 2349);
		assert_eq!(received.creation_time, 0);
		assert_eq!(received.total_amount, 99_874_442);
		assert_eq!(received.fee, 1_200_353 - 948_578);
		assert_eq!(received.hash, Hash([125; 32]));
		assert_eq!(received.extra, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
	}

	#[test]
	fn test_coinbase_like_incoming_has_no_fee() {
		let mut wallet = legacy_wallet();
		wallet.details = Some(LegacyDetails {
			transactions: vec![incoming(0)],
			transfers: Vec::new(),
		});
		let encoded = LegacyCodec.encode_wallet(&wallet, "pass").unwrap();
		let cache = LegacyCodec.decode(&encoded, "pass").unwrap().details.unwrap();
		assert_eq!(cache.get(0).unwrap().fee, 0);
	}

	#[test]
	fn test_missing_transfers_rejected() {
		let mut wallet = legacy_wallet();
		if let Some(details) = wallet.details.as_mut() {
			details.transfers.truncate(1);
		}
		let encoded = LegacyCodec.encode_wallet(&wallet, "pass").unwrap();
		assert!(matches!(
			LegacyCodec.decode(&encoded, "pass"),
			Err(PersistenceError::InvalidFormat(_))
		));
	}

	#[test]
	fn test_transfer_range_past_usize_rejected() {
		let mut wallet = legacy_wallet();
		if let Some(details) = wallet.details.as_mut() {
			details.transactions[0].first_transfer_id = Some(usize::MAX);
		}
		let encoded = LegacyCodec.encode_wallet(&wallet, "pass").unwrap();
		assert!(matches!(
			LegacyCodec.decode(&encoded, "pass"),
			Err(PersistenceError::InvalidFormat(_))
		));
	}

	#[test]
	fn test_wrong_password() {
		let encoded = LegacyCodec.encode_wallet(&legacy_wallet(), "pass").unwrap();
		assert!(matches!(
			LegacyCodec.decode(&encoded, "nope"),
			Err(PersistenceError::Authentication)
		));
	}
}
