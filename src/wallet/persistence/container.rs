//! Encrypted wallet container.
//!
//! ```text
//! magic "WSYN" | version u8 | flags u8 | kdf mem_kib u32le | kdf time_cost u32le
//!              | salt [16] | nonce [24] | ciphertext
//! ```
//!
//! The whole header is authenticated as associated data, so flipping a flag or a KDF parameter
//! fails decryption just like a wrong password does.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::*;

pub const MAGIC: &[u8; 4] = b"WSYN";
pub const VERSION: u8 = 1;

pub const FLAG_CACHE: u8 = 0x01;
pub const FLAG_DETAILS: u8 = 0x02;

const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 4 + SALT_LEN + NONCE_LEN;

#[derive(Serialize, Deserialize)]
struct ContainerBody {
	accounts: Vec<AccountKeys>,
	cache: Option<CacheSection>,
	details: Option<TransactionCache>,
}

/// Codec for the current wallet file format
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerCodec {
	kdf: KdfConfig,
}

impl ContainerCodec {
	/// `kdf` is used when encoding; decoding reads the parameters from the header.
	pub fn new(kdf: KdfConfig) -> Self {
		Self { kdf }
	}
}

impl WalletStateCodec for ContainerCodec {
	fn encode(&self, snapshot: &WalletSnapshot, password: &str) -> Result<Vec<u8>, PersistenceError> {
		let mut flags = 0u8;
		if snapshot.cache.is_some() {
			flags |= FLAG_CACHE;
		}
		if snapshot.details.is_some() {
			flags |= FLAG_DETAILS;
		}

		let salt: [u8; SALT_LEN] = random_bytes();
		let nonce: [u8; NONCE_LEN] = random_bytes();

		let mut header = Vec::with_capacity(HEADER_LEN);
		header.extend_from_slice(MAGIC);
		header.push(VERSION);
		header.push(flags);
		header.extend_from_slice(&self.kdf.mem_kib.to_le_bytes());
		header.extend_from_slice(&self.kdf.time_cost.to_le_bytes());
		header.extend_from_slice(&salt);
		header.extend_from_slice(&nonce);

		let body = bincode::serialize(&ContainerBody {
			accounts: snapshot.accounts.clone(),
			cache: snapshot.cache.clone(),
			details: snapshot.details.clone(),
		})
		.map_err(|e| PersistenceError::Serialization(e.to_string()))?;

		let key = derive_key(password, &salt, self.kdf)?;
		let ciphertext = seal(&key, &nonce, &body, &header)?;

		debug!(
			"Encoded wallet container: {} accounts, flags {:#04x}, {} bytes",
			snapshot.accounts.len(),
			flags,
			HEADER_LEN + ciphertext.len()
		);
		header.extend_from_slice(&ciphertext);
		Ok(header)
	}

	fn decode(&self, data: &[u8], password: &str) -> Result<WalletSnapshot, PersistenceError> {
		if data.len() < HEADER_LEN {
			return Err(PersistenceError::InvalidFormat(format!(
				"container is {} bytes, shorter than its header",
				data.len()
			)));
		}
		let (header, ciphertext) = data.split_at(HEADER_LEN);
		if &header[..4] != MAGIC {
			return Err(PersistenceError::InvalidFormat(
				"missing container signature".to_string(),
			));
		}
		if header[4] != VERSION {
			return Err(PersistenceError::UnsupportedVersion(header[4] as u32));
		}
		let flags = header[5];
		let read_u32 = |offset: usize| {
			let mut bytes = [0u8; 4];
			bytes.copy_from_slice(&header[offset..offset + 4]);
			u32::from_le_bytes(bytes)
		};
		let kdf = KdfConfig {
			mem_kib: read_u32(6),
			time_cost: read_u32(10),
		};
		let salt = &header[14..14 + SALT_LEN];
		let nonce = &header[14 + SALT_LEN..HEADER_LEN];

		let key = derive_key(password, salt, kdf)?;
		let body = open(&key, nonce, ciphertext, header)?;
		let body: ContainerBody =
			bincode::deserialize(&body).map_err(|e| PersistenceError::Serialization(e.to_string()))?;

		Ok(WalletSnapshot {
			accounts: body.accounts,
			cache: body.cache.filter(|_| flags & FLAG_CACHE != 0),
			details: body.details.filter(|_| flags & FLAG_DETAILS != 0),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn codec() -> ContainerCodec {
		ContainerCodec::new(KdfConfig {
			mem_kib: 64,
			time_cost: 1,
		})
	}

	fn snapshot() -> WalletSnapshot {
		WalletSnapshot {
			accounts: vec![AccountKeys::generate(), AccountKeys::generate()],
			cache: Some(CacheSection::default()),
			details: None,
		}
	}

	#[test]
	fn test_header_layout() {
		let original = snapshot();
		let encoded = codec().encode(&original, "pass").unwrap();
		assert_eq!(&encoded[..4], b"WSYN");
		assert_eq!(encoded[4], VERSION);
		assert_eq!(encoded[5], FLAG_CACHE);
		assert_eq!(&encoded[6..10], &64u32.to_le_bytes());
		assert_eq!(&encoded[10..14], &1u32.to_le_bytes());

		let decoded = codec().decode(&encoded, "pass").unwrap();
		assert_eq!(decoded.accounts, original.accounts);
		assert!(decoded.cache.is_some());
		assert!(decoded.details.is_none());
	}

	#[test]
	fn test_wrong_password() {
		let encoded = codec().encode(&snapshot(), "pass").unwrap();
		assert!(matches!(
			codec().decode(&encoded, "other"),
			Err(PersistenceError::Authentication)
		));
	}

	#[test]
	fn test_tampered_header_fails_authentication() {
		let mut encoded = codec().encode(&snapshot(), "pass").unwrap();
		encoded[5] |= FLAG_DETAILS;
		assert!(matches!(
			codec().decode(&encoded, "pass"),
			Err(PersistenceError::Authentication)
		));
	}

	#[test]
	fn test_rejects_unknown_version_and_truncation() {
		let mut encoded = codec().encode(&snapshot(), "pass").unwrap();
		assert!(matches!(
			codec().decode(&encoded[..20], "pass"),
			Err(PersistenceError::InvalidFormat(_))
		));
		encoded[4] = 9;
		assert!(matches!(
			codec().decode(&encoded, "pass"),
			Err(PersistenceError::UnsupportedVersion(9))
		));
	}
}
