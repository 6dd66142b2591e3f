//! Progress tracking for wallet synchronization.
//!
//! This module provides the `SyncProgressTracker`, which records the block heights applied during
//! one catch-up pass, counts the wallet transactions found in them, and reports statistics. Gap
//! detection guards against a node that skips heights.

use std::collections::BTreeSet;
use tracing::{info, warn};

/// Blocks between two periodic progress log lines
const LOG_INTERVAL: u64 = 1000;

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// The highest block height we've applied
    highest_processed_height: u64,
    /// Track if we've applied any block
    has_processed_data: bool,
    /// Track all block heights we've applied
    processed_heights: BTreeSet<u64>,
    /// Starting height for this pass
    start_height: u64,
    /// Wallet transactions found in the applied blocks
    transactions_processed: usize,
    /// Last height at which we logged progress
    last_logged_height: u64,
}

impl SyncProgressTracker {
    /// Create a new progress tracker starting from the given height.
    pub fn new(start_height: u64) -> Self {
        Self {
            highest_processed_height: start_height,
            has_processed_data: false,
            processed_heights: BTreeSet::new(),
            start_height,
            transactions_processed: 0,
            last_logged_height: start_height,
        }
    }

    /// Record that a block was applied, with the number of wallet transactions in it
    pub fn record_block(&mut self, height: u64, transactions: usize) {
        self.highest_processed_height = self.highest_processed_height.max(height);
        self.has_processed_data = true;
        self.processed_heights.insert(height);
        self.transactions_processed += transactions;
    }

    /// Forget heights above `height` after the chain was detached there
    pub fn record_detach(&mut self, height: u64) {
        self.processed_heights.retain(|h| *h <= height);
        self.highest_processed_height = self
            .processed_heights
            .last()
            .copied()
            .unwrap_or(self.start_height)
            .min(self.highest_processed_height);
    }

    pub fn highest_processed_height(&self) -> u64 {
        self.highest_processed_height
    }

    /// Returns (start, end) pairs of heights with missing blocks between them.
    pub fn check_for_gaps(&self) -> Vec<(u64, u64)> {
        self.processed_heights
            .iter()
            .zip(self.processed_heights.iter().skip(1))
            .filter(|(a, b)| **b - **a > 1)
            .map(|(a, b)| (*a, *b))
            .collect()
    }

    /// Log progress at regular intervals or when forced
    pub fn log_progress(&mut self, force: bool) {
        let blocks_since_last_log = self
            .highest_processed_height
            .saturating_sub(self.last_logged_height);
        let should_log = force || blocks_since_last_log >= LOG_INTERVAL;

        if should_log && self.has_processed_data {
            info!(
                "Sync progress: {} wallet transactions in blocks up to height {}",
                self.transactions_processed, self.highest_processed_height
            );
            self.last_logged_height = self.highest_processed_height;
        }
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_height: self.start_height,
            highest_processed_height: self.highest_processed_height,
            has_processed_data: self.has_processed_data,
            blocks_processed: self.processed_heights.len(),
            transactions_processed: self.transactions_processed,
            gaps: self.check_for_gaps(),
        }
    }

    /// Warns about gaps; an empty pass is fine when the wallet was already up to date
    pub fn validate_completion(&self) -> bool {
        let gaps = self.check_for_gaps();
        for (start, end) in &gaps {
            warn!("Gap detected: missing blocks between {} and {}", start, end);
        }
        gaps.is_empty()
    }
}

/// Statistics about one catch-up pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub start_height: u64,
    pub highest_processed_height: u64,
    pub has_processed_data: bool,
    pub blocks_processed: usize,
    pub transactions_processed: usize,
    pub gaps: Vec<(u64, u64)>,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "Sync from {} to {}: {} blocks, {} wallet transactions{}",
            self.start_height,
            self.highest_processed_height,
            self.blocks_processed,
            self.transactions_processed,
            if self.gaps.is_empty() {
                String::new()
            } else {
                format!(" ({} gaps)", self.gaps.len())
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_detection() {
        let mut tracker = SyncProgressTracker::new(1);
        tracker.record_block(1, 0);
        tracker.record_block(2, 1);
        tracker.record_block(5, 2);
        assert_eq!(tracker.check_for_gaps(), vec![(2, 5)]);
        assert!(!tracker.validate_completion());

        let stats = tracker.get_stats();
        assert_eq!(stats.blocks_processed, 3);
        assert_eq!(stats.transactions_processed, 3);
        assert_eq!(stats.highest_processed_height, 5);
        assert!(stats.summary().ends_with("(1 gaps)"));
    }

    #[test]
    fn test_detach_forgets_heights() {
        let mut tracker = SyncProgressTracker::new(0);
        for height in 0..5 {
            tracker.record_block(height, 0);
        }
        tracker.record_detach(2);
        assert_eq!(tracker.highest_processed_height(), 2);
        tracker.record_block(3, 0);
        assert!(tracker.check_for_gaps().is_empty());
    }
}
