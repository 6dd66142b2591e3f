//! Event notification for wallet callers.
//!
//! State changes produced by synchronization and transfers are queued as [`WalletEvent`]s and
//! consumed one at a time through `Wallet::wait_event`. The notifier has a start/stop lifecycle:
//! once stopped, pending and future waits fail with `WalletError::Stopped` until it is started
//! again. A [`StopHandle`] can be cloned out of the notifier so that another task can cancel a
//! wait in progress.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use crate::wallet::types::WalletError;

/// Changes observable by wallet callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// A transaction was added to the cache
    TransactionCreated { transaction_index: usize },
    /// A cached transaction changed state, height or transfers
    TransactionUpdated { transaction_index: usize },
    /// Actual or pending balance changed
    BalanceUpdated,
    /// Blocks up to `processed` of `total` have been applied
    SyncProgressUpdated { processed: u64, total: u64 },
    /// The wallet caught up with the node
    SyncCompleted,
    /// Synchronization failed; it resumes with the next chain notification
    SyncError { message: String },
}

/// Cancels waits on an [`EventNotifier`] from any task.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Resolves once [`StopHandle::stop`] has been called.
    pub async fn stopped(&self) {
        let mut notified = pin!(self.notify.notified());
        loop {
            // register before checking the flag so a concurrent stop cannot be missed
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }
}

/// Single-consumer queue of wallet events.
#[derive(Debug, Default)]
pub struct EventNotifier {
    queue: VecDeque<WalletEvent>,
    stop: StopHandle,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: WalletEvent) {
        tracing::trace!("Queued wallet event {:?}", event);
        self.queue.push_back(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = WalletEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Takes the oldest queued event, failing once the notifier is stopped.
    pub fn pop(&mut self) -> Result<Option<WalletEvent>, WalletError> {
        if self.stop.is_stopped() {
            return Err(WalletError::Stopped);
        }
        Ok(self.queue.pop_front())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn start(&self) {
        self.stop.start();
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let mut notifier = EventNotifier::new();
        notifier.push(WalletEvent::BalanceUpdated);
        notifier.push(WalletEvent::SyncCompleted);
        assert_eq!(notifier.pop().unwrap(), Some(WalletEvent::BalanceUpdated));
        assert_eq!(notifier.pop().unwrap(), Some(WalletEvent::SyncCompleted));
        assert_eq!(notifier.pop().unwrap(), None);
    }

    #[test]
    fn test_stop_and_restart() {
        let mut notifier = EventNotifier::new();
        notifier.push(WalletEvent::BalanceUpdated);
        notifier.stop();
        assert!(matches!(notifier.pop(), Err(WalletError::Stopped)));

        notifier.start();
        assert_eq!(notifier.pop().unwrap(), Some(WalletEvent::BalanceUpdated));
    }

    #[tokio::test]
    async fn test_stop_wakes_waiter() {
        let notifier = EventNotifier::new();
        let handle = notifier.stop_handle();
        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.stopped().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
