mod common;

use common::*;
use wallet_state_sync::node::Node;
use wallet_state_sync::transaction::UNCONFIRMED_TRANSACTION_HEIGHT;
use wallet_state_sync::wallet::{SyncStatus, TransactionState};
use wallet_state_sync::{TransferRequest, Wallet, WalletEvent};

#[tokio::test]
async fn test_duplicate_notifications_apply_once() {
	let node = node();
	let (mut wallet, address) = open_wallet(&node).await;

	node.generate_single_output_transaction(&parse(&address), 500);
	node.update_observers();
	node.update_observers();
	node.update_observers();
	wallet.process_notifications().await.unwrap();

	assert_eq!(wallet.get_transaction_count().unwrap(), 1);
	assert_eq!(wallet.get_pending_balance().unwrap(), 500);
	assert_eq!(wallet.sync_status(), SyncStatus::Synced);
}

#[tokio::test]
async fn test_detach_removes_discovered_transactions() {
	let node = node();
	let (mut wallet, address) = open_wallet(&node).await;
	node.generate_single_output_transaction(&parse(&address), 500);
	sync(&node, &mut [&mut wallet]).await;
	drain_events(&mut wallet);

	node.start_alternative_chain(1);
	node.generate_empty_blocks(2);
	sync(&node, &mut [&mut wallet]).await;

	let removed = wallet.get_transaction(0).unwrap();
	assert_eq!(removed.state, TransactionState::Deleted);
	assert_eq!(removed.block_height, UNCONFIRMED_TRANSACTION_HEIGHT);
	assert_eq!(wallet.get_transaction_transfer_count(0).unwrap(), 0);
	assert_eq!(wallet.get_pending_balance().unwrap(), 0);
	assert_eq!(wallet.get_actual_balance().unwrap(), 0);

	let events = drain_events(&mut wallet);
	assert!(events.contains(&WalletEvent::TransactionUpdated {
		transaction_index: 0
	}));
	assert!(events.contains(&WalletEvent::BalanceUpdated));
}

#[tokio::test]
async fn test_transaction_included_again_after_detach_is_revived() {
	let node = node();
	let (mut wallet, address) = open_wallet(&node).await;
	node.generate_single_output_transaction(&parse(&address), 500);
	sync(&node, &mut [&mut wallet]).await;
	let funding = node.block(1).unwrap().transactions[1].clone();

	node.start_alternative_chain(1);
	node.relay_transaction(&funding).await.unwrap();
	sync(&node, &mut [&mut wallet]).await;

	assert_eq!(wallet.get_transaction_count().unwrap(), 1);
	let revived = wallet.get_transaction(0).unwrap();
	assert_eq!(revived.state, TransactionState::Succeeded);
	assert_eq!(revived.block_height, 1);
	assert_eq!(revived.hash, funding.hash());
	assert_eq!(wallet.get_transaction_transfer_count(0).unwrap(), 1);
	assert_eq!(wallet.get_transaction_transfer(0, 0).unwrap().amount, 500);
	assert_eq!(wallet.get_pending_balance().unwrap(), 500);
}

#[tokio::test]
async fn test_detach_keeps_own_transaction_unconfirmed() {
	let node = node();
	let (mut alice, alice_address) = open_wallet(&node).await;
	let (mut bob, bob_address) = open_wallet(&node).await;
	fund(&node, &mut alice, &alice_address).await;

	let amount = 1_000_000_000_000u64;
	let index = alice
		.transfer(
			TransferRequest::new()
				.with_destination(&bob_address, amount as i64)
				.with_fee(FEE),
		)
		.await
		.unwrap();
	sync(&node, &mut [&mut alice, &mut bob]).await;
	let included = alice.get_transaction(index).unwrap().block_height;
	assert_ne!(included, UNCONFIRMED_TRANSACTION_HEIGHT);
	assert_eq!(bob.get_pending_balance().unwrap(), amount);

	node.start_alternative_chain(included);
	node.generate_empty_blocks(2);
	sync(&node, &mut [&mut alice, &mut bob]).await;

	let sent = alice.get_transaction(index).unwrap();
	assert_eq!(sent.state, TransactionState::Succeeded);
	assert_eq!(sent.block_height, UNCONFIRMED_TRANSACTION_HEIGHT);
	assert_eq!(alice.get_actual_balance().unwrap(), 0);
	assert_eq!(alice.get_pending_balance().unwrap(), REWARD - amount - FEE);

	assert_eq!(
		bob.get_transaction(0).unwrap().state,
		TransactionState::Deleted
	);
	assert_eq!(bob.get_pending_balance().unwrap(), 0);
}

#[tokio::test]
async fn test_detach_below_unlock_returns_balance_to_pending() {
	let node = node();
	let (mut wallet, address) = open_wallet(&node).await;
	fund(&node, &mut wallet, &address).await;
	assert_eq!(wallet.get_actual_balance().unwrap(), REWARD);

	// the reward is at height 1 and needs the chain to reach height 11
	node.start_alternative_chain(5);
	sync(&node, &mut [&mut wallet]).await;
	assert_eq!(wallet.get_actual_balance().unwrap(), 0);
	assert_eq!(wallet.get_pending_balance().unwrap(), REWARD);
}

#[tokio::test]
async fn test_progress_is_reported_per_batch() {
	let node = node();
	let mut config = config();
	config.sync.batch_size = 100;
	let mut wallet = Wallet::new(node.clone(), config);
	wallet.initialize("pass").unwrap();
	wallet.process_notifications().await.unwrap();
	drain_events(&mut wallet);

	node.generate_empty_blocks(250);
	sync(&node, &mut [&mut wallet]).await;

	let progress: Vec<(u64, u64)> = drain_events(&mut wallet)
		.into_iter()
		.filter_map(|event| match event {
			WalletEvent::SyncProgressUpdated { processed, total } => Some((processed, total)),
			_ => None,
		})
		.collect();
	assert_eq!(progress.len(), 3);
	assert!(progress.windows(2).all(|pair| pair[0].0 < pair[1].0));
	assert_eq!(progress.last(), Some(&(250, 250)));
	assert!(progress.iter().all(|(_, total)| *total == 250));
}

#[tokio::test]
async fn test_pool_update_changes_nothing() {
	let node = node();
	let (mut wallet, _) = open_wallet(&node).await;
	drain_events(&mut wallet);

	node.notify_pool_updated();
	wallet.process_notifications().await.unwrap();
	assert!(drain_events(&mut wallet).is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_notifications() {
	let node = node();
	let (mut wallet, address) = open_wallet(&node).await;
	wallet.shutdown().unwrap();

	node.generate_block_reward(&parse(&address));
	node.update_observers();

	wallet.initialize("pass").unwrap();
	wallet.process_notifications().await.unwrap();
	// the address is gone with the old state, so the reward is not the wallet's
	assert_eq!(wallet.get_transaction_count().unwrap(), 0);
	assert_eq!(drain_events(&mut wallet).last(), Some(&WalletEvent::SyncCompleted));
}
