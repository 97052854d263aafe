//! Side-effect notification for coin-creation transactions.

use std::sync::{Arc, Mutex};

use crate::types::Transaction;

/// Receives the defining transaction of every newly observed coin.
///
/// Delivery is fire-and-forget: `notify` must not block the ingestion loop and
/// failures stay inside the implementation.
pub trait CoinNotifier: Send + Sync {
    fn notify(&self, tx: Transaction);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCoinNotifier;

impl CoinNotifier for NoopCoinNotifier {
    fn notify(&self, _tx: Transaction) {}
}

/// Collects notifications in memory. Useful in tests and for embedding.
#[derive(Debug, Default, Clone)]
pub struct RecordingCoinNotifier {
    seen: Arc<Mutex<Vec<Transaction>>>,
}

impl RecordingCoinNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes of the transactions received so far.
    pub fn hashes(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|t| t.hash.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CoinNotifier for RecordingCoinNotifier {
    fn notify(&self, tx: Transaction) {
        self.seen.lock().unwrap().push(tx);
    }
}
