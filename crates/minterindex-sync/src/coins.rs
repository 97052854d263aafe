//! Coin registry side effect.
//!
//! The loop hands every committed create-coin transaction to a
//! [`CoinNotifier`]. [`QueuedCoinNotifier`] puts it on a bounded queue without
//! waiting; [`run_coin_consumer`] turns each one into a [`Coin`] row.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use minterindex_core::{ChainStore, Coin, CoinNotifier, Transaction};

/// Non-blocking notifier backed by a bounded channel. A full queue drops the
/// notification.
#[derive(Clone)]
pub struct QueuedCoinNotifier {
    tx: mpsc::Sender<Transaction>,
}

impl CoinNotifier for QueuedCoinNotifier {
    fn notify(&self, tx: Transaction) {
        match self.tx.try_send(tx) {
            Ok(()) => {}
            Err(TrySendError::Full(tx)) => {
                warn!(hash = %tx.hash, "coin queue full, notification dropped");
            }
            Err(TrySendError::Closed(tx)) => {
                debug!(hash = %tx.hash, "coin consumer gone, notification dropped");
            }
        }
    }
}

/// Bounded notifier/receiver pair.
pub fn coin_channel(capacity: usize) -> (QueuedCoinNotifier, mpsc::Receiver<Transaction>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueuedCoinNotifier { tx }, rx)
}

/// Register coins until the queue is closed and drained. Returns the number
/// of coins written.
pub async fn run_coin_consumer(
    store: Arc<dyn ChainStore>,
    mut rx: mpsc::Receiver<Transaction>,
) -> usize {
    let mut registered = 0;
    while let Some(tx) = rx.recv().await {
        let Some(coin) = Coin::from_transaction(&tx) else {
            debug!(hash = %tx.hash, "not a successful coin creation, skipped");
            continue;
        };
        match store.upsert_coin(&coin).await {
            Ok(()) => {
                registered += 1;
                debug!(symbol = %coin.symbol, hash = %tx.hash, "coin registered");
            }
            Err(e) => warn!(symbol = %coin.symbol, error = %e, "coin registration failed"),
        }
    }
    registered
}

#[cfg(test)]
mod tests {
    use super::*;
    use minterindex_core::transform_block;
    use minterindex_storage::InMemoryStorage;

    use crate::test_utils::{block_json, create_coin_tx, send_tx};

    fn txs() -> Vec<Transaction> {
        let raw = block_json(
            1,
            vec![create_coin_tx("Mt01", "ABC"), send_tx("Mt02")],
            None,
        );
        transform_block(&raw, None).unwrap().transactions
    }

    #[tokio::test]
    async fn consumer_registers_created_coins_only() {
        let store = Arc::new(InMemoryStorage::new());
        let (notifier, rx) = coin_channel(8);
        for tx in txs() {
            notifier.notify(tx);
        }
        drop(notifier);

        let registered = run_coin_consumer(store.clone(), rx).await;
        assert_eq!(registered, 1);
        let coin = store.coin("ABC").unwrap();
        assert_eq!(coin.name.as_deref(), Some("Test Coin"));
        assert_eq!(coin.constant_reserve_ratio, Some(50));
        assert_eq!(coin.creation_tx_hash, "Mt01");
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (notifier, mut rx) = coin_channel(1);
        let mut all = txs();
        notifier.notify(all.remove(0));
        notifier.notify(all.remove(0));
        drop(notifier);

        assert_eq!(rx.recv().await.unwrap().hash, "Mt01");
        assert!(rx.recv().await.is_none());
    }
}
