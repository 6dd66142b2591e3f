//! Key material for managed addresses.
//!
//! Secret keys are random 32-byte scalars; public keys are derived from them with a
//! domain-separated BLAKE3 key derivation. Ring signatures are represented by keyed hashes
//! over the transaction prefix, one per ring member.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::Hash;
use crate::transaction::address::AccountAddress;

const SPEND_PUBLIC_CONTEXT: &str = "wallet-state-sync 2024 spend public key";
const VIEW_PUBLIC_CONTEXT: &str = "wallet-state-sync 2024 view public key";
const RING_MEMBER_CONTEXT: &str = "wallet-state-sync 2024 ring member";

/// Public half of a key pair. Output destinations are spend public keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl fmt::Debug for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PublicKey({})", hex::encode(self.0))
	}
}

impl fmt::Display for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&hex::encode(self.0))
	}
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey(pub [u8; 32]);

impl fmt::Debug for SecretKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretKey(..)")
	}
}

impl SecretKey {
	pub fn random() -> Self {
		let mut bytes = [0u8; 32];
		rand::rng().fill(&mut bytes);
		Self(bytes)
	}
}

/// One ring member signature over a transaction prefix hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub [u8; 32]);

/// Full key material of one managed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKeys {
	pub spend_public: PublicKey,
	pub view_public: PublicKey,
	pub spend_secret: SecretKey,
	pub view_secret: SecretKey,
	/// UNIX seconds at which the keys were generated.
	pub creation_timestamp: u64,
}

impl AccountKeys {
	pub fn generate() -> Self {
		let spend_secret = SecretKey::random();
		let view_secret = SecretKey::random();
		Self::from_secrets(
			spend_secret,
			view_secret,
			chrono::Utc::now().timestamp().max(0) as u64,
		)
	}

	pub fn from_secrets(spend_secret: SecretKey, view_secret: SecretKey, creation_timestamp: u64) -> Self {
		Self {
			spend_public: derive_public(SPEND_PUBLIC_CONTEXT, &spend_secret),
			view_public: derive_public(VIEW_PUBLIC_CONTEXT, &view_secret),
			spend_secret,
			view_secret,
			creation_timestamp,
		}
	}

	pub fn address(&self) -> AccountAddress {
		AccountAddress {
			spend_public: self.spend_public,
			view_public: self.view_public,
		}
	}

	/// Produces `ring_size` signatures binding this key to `prefix_hash`.
	pub fn sign_ring(&self, prefix_hash: &Hash, ring_size: usize) -> Vec<Signature> {
		(0..ring_size)
			.map(|member| {
				let mut hasher = blake3::Hasher::new_keyed(&self.spend_secret.0);
				hasher.update(RING_MEMBER_CONTEXT.as_bytes());
				hasher.update(&prefix_hash.0);
				hasher.update(&(member as u64).to_le_bytes());
				Signature(*hasher.finalize().as_bytes())
			})
			.collect()
	}
}

fn derive_public(context: &str, secret: &SecretKey) -> PublicKey {
	PublicKey(blake3::derive_key(context, &secret.0))
}

/// Random one-time key placed in the transaction extra field.
pub fn random_transaction_key() -> PublicKey {
	derive_public(SPEND_PUBLIC_CONTEXT, &SecretKey::random())
}
