//!
//! Wallet configuration.
//!
//! Every section has defaults, so a TOML file only needs the values it overrides:
//!
//! ```toml
//! [currency]
//! minimum_fee = 1000000
//! confirmation_depth = 10
//!
//! [sync]
//! batch_size = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("Failed to read config file {path}: {source}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("Invalid TOML in config file: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("Invalid configuration: {0}")]
	Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
	pub currency: CurrencyConfig,
	pub sync: SyncConfig,
	pub kdf: KdfConfig,
}

/// Currency rules the wallet enforces locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
	pub minimum_fee: u64,
	/// Blocks an output must be buried under before it counts as actual balance.
	pub confirmation_depth: u64,
	/// Largest serialized transaction the wallet will relay, in bytes.
	pub max_transaction_size: usize,
}

impl Default for CurrencyConfig {
	fn default() -> Self {
		Self {
			minimum_fee: 1_000_000,
			confirmation_depth: 10,
			max_transaction_size: 100_000,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Blocks requested from the node per query.
	pub batch_size: u64,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self { batch_size: 100 }
	}
}

/// Argon2id cost parameters used when a container is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
	pub mem_kib: u32,
	pub time_cost: u32,
}

impl Default for KdfConfig {
	fn default() -> Self {
		Self {
			mem_kib: 19_456,
			time_cost: 2,
		}
	}
}

impl WalletConfig {
	/// Read the TOML file at `path`.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
			path: path.as_ref().display().to_string(),
			source,
		})?;
		Self::from_toml_str(&text)
	}

	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.sync.batch_size == 0 {
			return Err(ConfigError::Invalid("sync.batch_size must be positive".into()));
		}
		if self.kdf.mem_kib < 8 || self.kdf.time_cost == 0 {
			return Err(ConfigError::Invalid(
				"kdf.mem_kib must be at least 8 and kdf.time_cost positive".into(),
			));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_partial_toml_keeps_defaults() {
		let config = WalletConfig::from_toml_str(
			r#"
			[currency]
			confirmation_depth = 3

			[kdf]
			mem_kib = 64
			"#,
		)
		.unwrap();
		assert_eq!(config.currency.confirmation_depth, 3);
		assert_eq!(config.currency.minimum_fee, CurrencyConfig::default().minimum_fee);
		assert_eq!(config.kdf.mem_kib, 64);
		assert_eq!(config.kdf.time_cost, 2);
		assert_eq!(config.sync, SyncConfig::default());
	}

	#[test]
	fn test_rejects_zero_batch() {
		assert!(matches!(
			WalletConfig::from_toml_str("[sync]\nbatch_size = 0"),
			Err(ConfigError::Invalid(_))
		));
		assert!(matches!(
			WalletConfig::from_toml_str("[sync"),
			Err(ConfigError::Parse(_))
		));
	}

	#[test]
	fn test_load_missing_file() {
		let err = WalletConfig::load("/nonexistent/wallet.toml").unwrap_err();
		assert!(err.to_string().contains("/nonexistent/wallet.toml"));
	}
}
