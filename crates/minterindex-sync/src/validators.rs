//! Validator worker. Reconciles the validator set of each ingested height
//! with the store and links the validators to the block.
//!
//! Jobs arrive on a bounded queue in height order. A failing height is retried
//! with backoff a bounded number of times and then dropped; the block keeps no
//! links in that case.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use minterindex_core::reconcile::{public_keys, reconcile};
use minterindex_core::{ChainStore, IndexerError};
use minterindex_node::{NodeApi, RetryPolicy};

pub struct ValidatorWorker {
    node: Arc<dyn NodeApi>,
    store: Arc<dyn ChainStore>,
    retry: RetryPolicy,
}

impl ValidatorWorker {
    pub fn new(node: Arc<dyn NodeApi>, store: Arc<dyn ChainStore>, retry: RetryPolicy) -> Self {
        Self { node, store, retry }
    }

    /// Fetch, reconcile, upsert and link the validators of `height`.
    ///
    /// Returns the number of validators linked.
    pub async fn process(&self, height: u64) -> Result<usize, IndexerError> {
        let entries = self.node.validators(height).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let keys = public_keys(&entries);
        let existing = self.store.validators_by_pub_key(&keys).await?;
        let changes = reconcile(&entries, &existing);
        let ids = self.store.apply_validator_changes(&changes).await?;
        self.store.link_block_validators(height, &ids).await?;
        Ok(ids.len())
    }

    /// [`process`](Self::process) with bounded retries. Returns `false` if the
    /// job was dropped.
    pub async fn process_with_retry(&self, height: u64) -> bool {
        let mut attempt = 0u32;
        loop {
            match self.process(height).await {
                Ok(linked) => {
                    debug!(height, linked, "validators reconciled");
                    return true;
                }
                Err(e) => {
                    attempt += 1;
                    match self.retry.next_delay(attempt) {
                        Some(delay) => {
                            warn!(
                                height,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "validator reconciliation failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(height, attempt, error = %e, "validator reconciliation dropped");
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Consume jobs until the queue is closed and drained.
    pub async fn run(self, mut jobs: mpsc::Receiver<u64>) {
        while let Some(height) = jobs.recv().await {
            self.process_with_retry(height).await;
        }
        debug!("validator worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use minterindex_node::RetryConfig;
    use minterindex_storage::InMemoryStorage;

    use crate::test_utils::{block_json, validator_entry, FakeNode};
    use minterindex_core::transform_block;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries: Some(max_retries),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            multiplier: 1.0,
        })
    }

    async fn store_with_blocks(heights: &[u64]) -> Arc<InMemoryStorage> {
        let store = Arc::new(InMemoryStorage::new());
        for h in heights {
            let block = transform_block(&block_json(*h, vec![], None), None).unwrap();
            store.insert_block(&block).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn same_key_across_heights_is_one_row_two_links() {
        let node = Arc::new(FakeNode::new());
        node.put_validators(1, vec![validator_entry("Mp01", "100")]);
        node.put_validators(2, vec![validator_entry("Mp01", "250")]);
        let store = store_with_blocks(&[1, 2]).await;

        let worker = ValidatorWorker::new(node, store.clone(), fast_retry(0));
        assert_eq!(worker.process(1).await.unwrap(), 1);
        assert_eq!(worker.process(2).await.unwrap(), 1);

        assert_eq!(store.validator_count(), 1);
        assert_eq!(store.link_count(), 2);
        let v = store.validator("Mp01").unwrap();
        assert_eq!(v.record.total_stake, "250");
        assert_eq!(v.record.name, None);
        assert_eq!(store.links_for(1), vec![v.id]);
        assert_eq!(store.links_for(2), vec![v.id]);
    }

    #[tokio::test]
    async fn duplicate_key_in_one_response_links_once() {
        let node = Arc::new(FakeNode::new());
        node.put_validators(
            1,
            vec![validator_entry("Mp01", "1"), validator_entry("Mp01", "2")],
        );
        let store = store_with_blocks(&[1]).await;

        let worker = ValidatorWorker::new(node, store.clone(), fast_retry(0));
        assert_eq!(worker.process(1).await.unwrap(), 1);
        assert_eq!(store.validator("Mp01").unwrap().record.total_stake, "2");
        assert_eq!(store.link_count(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let node = Arc::new(FakeNode::new());
        node.put_validators(1, vec![validator_entry("Mp01", "1")]);
        node.fail_validators(1, 2);
        let store = store_with_blocks(&[1]).await;

        let worker = ValidatorWorker::new(node, store.clone(), fast_retry(3));
        assert!(worker.process_with_retry(1).await);
        assert_eq!(store.link_count(), 1);
    }

    #[tokio::test]
    async fn job_dropped_after_retries() {
        let node = Arc::new(FakeNode::new());
        node.put_validators(1, vec![validator_entry("Mp01", "1")]);
        node.fail_validators(1, 10);
        let store = store_with_blocks(&[1]).await;

        let worker = ValidatorWorker::new(node, store.clone(), fast_retry(2));
        assert!(!worker.process_with_retry(1).await);
        assert_eq!(store.validator_count(), 0);
    }

    #[tokio::test]
    async fn run_drains_queue_then_stops() {
        let node = Arc::new(FakeNode::new());
        node.put_validators(1, vec![validator_entry("Mp01", "1")]);
        node.put_validators(2, vec![validator_entry("Mp02", "1")]);
        let store = store_with_blocks(&[1, 2]).await;

        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(ValidatorWorker::new(node, store.clone(), fast_retry(0)).run(rx));
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(store.validator_count(), 2);
        assert_eq!(store.link_count(), 2);
    }
}
