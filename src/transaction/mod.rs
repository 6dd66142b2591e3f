/// Account address text codec
pub mod address;
/// Transaction builder for outgoing transfers
pub mod builder;
/// Key material and ring signing
pub mod keys;
/// Output selection policy
pub mod selection;

/// Tag preceding the 32-byte transaction public key in the extra field.
pub const TX_EXTRA_PUBLIC_KEY_TAG: u8 = 0x01;

/// Size of the tagged transaction public key at the start of the extra field.
pub const TX_EXTRA_PUBLIC_KEY_SIZE: usize = 33;

/// Height reported for transactions that are not included in a block.
pub const UNCONFIRMED_TRANSACTION_HEIGHT: u64 = u32::MAX as u64;

/// Number of decimal places of the native coin.
pub const COIN_DECIMALS: u32 = 12;
