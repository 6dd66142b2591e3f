pub mod config;
pub mod node;
pub mod transaction;
pub mod utils;
pub mod wallet;

pub use config::WalletConfig;
pub use node::{InMemoryNode, Node};
pub use wallet::{TransferRequest, Wallet, WalletError, WalletEvent};
