use bech32::{Bech32m, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::transaction::keys::PublicKey;

/// Human readable prefix of every wallet address.
pub const ADDRESS_HRP: Hrp = Hrp::parse_unchecked("wsync");

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
	#[error("address is not valid bech32m: {0}")]
	Encoding(String),
	#[error("address prefix '{0}' is not 'wsync'")]
	PrefixInvalid(String),
	#[error("address payload has {0} bytes, expected 64")]
	PayloadLength(usize),
}

/// Public part of an account: the key outputs are sent to and the key used to scan for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress {
	pub spend_public: PublicKey,
	pub view_public: PublicKey,
}

impl AccountAddress {
	pub fn decode(encoded: &str) -> Result<Self, AddressError> {
		let (hrp, data) =
			bech32::decode(encoded).map_err(|e| AddressError::Encoding(e.to_string()))?;
		if hrp != ADDRESS_HRP {
			return Err(AddressError::PrefixInvalid(hrp.as_str().to_string()));
		}
		if data.len() != 64 {
			return Err(AddressError::PayloadLength(data.len()));
		}

		let mut spend = [0u8; 32];
		let mut view = [0u8; 32];
		spend.copy_from_slice(&data[..32]);
		view.copy_from_slice(&data[32..]);
		Ok(Self {
			spend_public: PublicKey(spend),
			view_public: PublicKey(view),
		})
	}

	pub fn encode(&self) -> String {
		let data = [&self.spend_public.0[..], &self.view_public.0[..]].concat();
		// 64 bytes is far below the bech32m code length limit
		bech32::encode::<Bech32m>(ADDRESS_HRP, &data).unwrap_or_default()
	}
}

impl fmt::Display for AccountAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.encode())
	}
}
