pub mod address_registry;
pub mod balance;
pub mod events;
pub mod ledger;
pub mod persistence;
pub mod service;
pub mod state;
pub mod sync;
pub mod transactions;
pub mod transfer;
pub mod types;

pub use events::{StopHandle, WalletEvent};
pub use service::Wallet;
pub use sync::SyncStatus;
pub use transfer::{TransferDestination, TransferRequest};
pub use types::*;
