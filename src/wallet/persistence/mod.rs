//!
//! Wallet persistence.
//!
//! Two codecs implement [`WalletStateCodec`]: the current encrypted container and the legacy
//! single-account format, which is only imported (and exported for fixtures). Both derive the
//! encryption key with Argon2id and seal the body with XChaCha20-Poly1305. The repository layer
//! stores encoded containers on disk together with a small JSON metadata file.

pub mod container;
pub mod legacy;
pub mod repository;

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, NewAead, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::KdfConfig;
use crate::transaction::keys::AccountKeys;
use crate::wallet::ledger::OutputLedger;
use crate::wallet::state::ChainPosition;
use crate::wallet::transactions::TransactionCache;

pub use container::ContainerCodec;
pub use legacy::LegacyCodec;
pub use repository::{FileWalletRepository, RepositoryMetadata, WalletRepository};

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 24;

/// Upper bound accepted for the KDF memory cost read from a file header.
const MAX_KDF_MEM_KIB: u32 = 1 << 21;

#[derive(Error, Debug)]
pub enum PersistenceError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Invalid wallet file: {0}")]
	InvalidFormat(String),

	#[error("Unsupported wallet file version {0}")]
	UnsupportedVersion(u32),

	#[error("Wrong password or corrupted wallet file")]
	Authentication,

	#[error("Key derivation failed: {0}")]
	Kdf(String),

	#[error("Encryption failed: {0}")]
	Encryption(String),

	#[error("Serialization error: {0}")]
	Serialization(String),

	#[error("Metadata error: {0}")]
	Metadata(#[from] serde_json::Error),
}

/// Ledger and chain position, saved together so balances can be restored without a resync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSection {
	pub ledger: OutputLedger,
	pub chain: ChainPosition,
}

/// Decoded wallet file contents. Omitted sections are `None`.
#[derive(Debug, Clone, Default)]
pub struct WalletSnapshot {
	pub accounts: Vec<AccountKeys>,
	pub cache: Option<CacheSection>,
	pub details: Option<TransactionCache>,
}

/// A wallet file format.
pub trait WalletStateCodec {
	fn encode(&self, snapshot: &WalletSnapshot, password: &str) -> Result<Vec<u8>, PersistenceError>;

	fn decode(&self, data: &[u8], password: &str) -> Result<WalletSnapshot, PersistenceError>;
}

/// Picks the codec for `data` by its magic bytes.
pub fn codec_for(data: &[u8], kdf: KdfConfig) -> Result<Box<dyn WalletStateCodec>, PersistenceError> {
	match data.get(..4) {
		Some(magic) if magic == container::MAGIC => Ok(Box::new(ContainerCodec::new(kdf))),
		Some(magic) if magic == legacy::MAGIC => Ok(Box::new(LegacyCodec)),
		_ => Err(PersistenceError::InvalidFormat(
			"unknown file signature".to_string(),
		)),
	}
}

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
	let mut bytes = [0u8; N];
	rand::rng().fill(&mut bytes[..]);
	bytes
}

pub(crate) fn derive_key(password: &str, salt: &[u8], kdf: KdfConfig) -> Result<[u8; 32], PersistenceError> {
	if kdf.mem_kib > MAX_KDF_MEM_KIB {
		return Err(PersistenceError::InvalidFormat(format!(
			"KDF memory cost {} KiB is too large",
			kdf.mem_kib
		)));
	}
	let params = Params::new(kdf.mem_kib, kdf.time_cost, 1, None)
		.map_err(|e| PersistenceError::Kdf(format!("Invalid Argon2id params: {}", e)))?;
	let mut key = [0u8; 32];
	Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
		.hash_password_into(password.as_bytes(), salt, &mut key)
		.map_err(|e| PersistenceError::Kdf(e.to_string()))?;
	Ok(key)
}

pub(crate) fn seal(key: &[u8; 32], nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, PersistenceError> {
	XChaCha20Poly1305::new(Key::from_slice(key))
		.encrypt(
			XNonce::from_slice(nonce),
			Payload {
				msg: plaintext,
				aad,
			},
		)
		.map_err(|e| PersistenceError::Encryption(e.to_string()))
}

pub(crate) fn open(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, PersistenceError> {
	XChaCha20Poly1305::new(Key::from_slice(key))
		.decrypt(
			XNonce::from_slice(nonce),
			Payload {
				msg: ciphertext,
				aad,
			},
		)
		.map_err(|_| PersistenceError::Authentication)
}
