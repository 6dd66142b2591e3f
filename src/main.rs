use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use wallet_state_sync::transaction::COIN_DECIMALS;
use wallet_state_sync::transaction::address::AccountAddress;
use wallet_state_sync::utils::format_amount;
use wallet_state_sync::wallet::persistence::FileWalletRepository;
use wallet_state_sync::{InMemoryNode, TransferRequest, Wallet, WalletConfig, WalletError};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting wallet sync demo");

	let config = match std::env::args().nth(1) {
		Some(path) => match WalletConfig::load(&path) {
			Ok(config) => config,
			Err(e) => {
				error!("Failed to load config from {}: {}", path, e);
				return;
			}
		},
		None => WalletConfig::default(),
	};

	if let Err(e) = run(config).await {
		error!("Demo failed: {}", e);
	}
}

async fn run(config: WalletConfig) -> Result<(), WalletError> {
	let node = Arc::new(InMemoryNode::new());
	let depth = config.currency.confirmation_depth;

	let mut alice = Wallet::new(node.clone(), config.clone());
	alice.initialize("alice")?;
	let alice_address = alice.create_address()?;

	let mut bob = Wallet::new(node.clone(), config.clone());
	bob.initialize("bob")?;
	let bob_address = bob.create_address()?;

	node.generate_block_reward(&AccountAddress::decode(&alice_address)?);
	node.generate_empty_blocks(depth as usize);
	node.update_observers();
	alice.process_notifications().await?;
	bob.process_notifications().await?;
	info!(
		"Alice mined {} at height {}",
		format_amount(alice.get_actual_balance()?, COIN_DECIMALS),
		node.height()
	);

	let amount = 1_000_000_000_000;
	let index = alice
		.transfer(
			TransferRequest::new()
				.with_destination(bob_address.clone(), amount)
				.with_fee(config.currency.minimum_fee),
		)
		.await?;
	info!(
		"Alice sent transaction {} ({:?})",
		index,
		alice.get_transaction(index)?.state
	);

	node.generate_empty_blocks(depth as usize);
	node.update_observers();
	alice.process_notifications().await?;
	bob.process_notifications().await?;

	alice.log_balances()?;
	bob.log_balances()?;

	let repository = FileWalletRepository::new(PathBuf::from("wallet-data"), "alice");
	alice.save_to_repository(&repository, true, true).await?;

	while let Some(event) = alice.poll_event()? {
		info!("Alice event: {:?}", event);
	}

	alice.shutdown()?;
	bob.shutdown()?;
	Ok(())
}
