//! The ingestion loop, the single sequential driver of the indexer.
//!
//! # Startup
//! Read the head from the node (retried until it answers) and the highest
//! stored height. A non-empty store loses its highest block, which may have
//! been half-processed when the previous run died, and resumes there.
//!
//! # Cycle
//! While the cursor is at or below the last known head: fetch the block,
//! transform it, commit it, queue the validator job, notify coins, advance.
//! Once past the head, ask the node for a new head, sleeping the poll
//! interval only if it has not moved.
//!
//! A height that fails is retried with capped exponential backoff; the loop
//! never skips one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use minterindex_core::types::TxType;
use minterindex_core::{
    transform_block, Block, ChainStore, CoinNotifier, Cursor, IndexerConfig, IndexerError,
    IndexerState,
};
use minterindex_node::{NodeApi, RetryConfig, RetryPolicy};

use crate::coins::run_coin_consumer;
use crate::validators::ValidatorWorker;

/// Worker halves waiting to be spawned by [`IngestionLoop::run`].
pub(crate) struct PendingWorkers {
    pub validator: ValidatorWorker,
    pub validator_rx: mpsc::Receiver<u64>,
    pub coin_rx: Option<mpsc::Receiver<minterindex_core::Transaction>>,
}

pub struct IngestionLoop {
    config: IndexerConfig,
    node: Arc<dyn NodeApi>,
    store: Arc<dyn ChainStore>,
    notifier: Option<Arc<dyn CoinNotifier>>,
    validator_tx: Option<mpsc::Sender<u64>>,
    pending: Option<PendingWorkers>,
    workers: Vec<JoinHandle<()>>,
    retry: RetryPolicy,
    state: IndexerState,
}

impl IngestionLoop {
    pub(crate) fn new(
        config: IndexerConfig,
        node: Arc<dyn NodeApi>,
        store: Arc<dyn ChainStore>,
        notifier: Arc<dyn CoinNotifier>,
        validator_tx: mpsc::Sender<u64>,
        pending: PendingWorkers,
    ) -> Self {
        let retry = RetryPolicy::new(RetryConfig::from(&config.retry));
        Self {
            config,
            node,
            store,
            notifier: Some(notifier),
            validator_tx: Some(validator_tx),
            pending: Some(pending),
            workers: Vec::new(),
            retry,
            state: IndexerState::Idle,
        }
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Run until `to_height` is ingested, or forever if unset. A store that is
    /// already past `to_height` is left untouched. A loop runs only once.
    ///
    /// Returns an error only for non-transient failures; everything else is
    /// retried.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        if self.validator_tx.is_none() {
            return Err(IndexerError::Config(
                "ingestion loop has already run; build a new one".into(),
            ));
        }
        self.spawn_workers();

        self.set_state(IndexerState::Recovering);
        let head = self.retry_forever("node status", || self.node.status()).await?;
        let last = self
            .retry_forever("read last height", || self.store.last_height())
            .await?;

        if let Some(to) = self.config.to_height {
            if last > to {
                warn!(stored = last, to_height = to, "store is already past to_height, nothing to ingest");
                self.shutdown().await;
                self.set_state(IndexerState::Stopped);
                return Ok(());
            }
        }

        if last > 0 {
            let deleted = self
                .retry_forever("delete last block", || self.store.delete_block(last))
                .await?;
            info!(height = last, deleted, "removed last stored block for re-ingestion");
        }

        let mut cursor = Cursor::resume(last, self.config.from_height, head);
        info!(from = cursor.height, head, "starting ingestion");

        let poll = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if let Some(to) = self.config.to_height {
                if cursor.height > to {
                    break;
                }
            }

            if cursor.has_pending() {
                self.set_state(IndexerState::CatchingUp);
                self.ingest_with_retry(cursor.height).await?;
                cursor.advance();
                continue;
            }

            self.set_state(IndexerState::Following);
            match self.node.status().await {
                Ok(h) => {
                    if cursor.update_head(h) {
                        trace!(head = h, lag = cursor.lag(), "new head");
                    } else {
                        tokio::time::sleep(poll).await;
                    }
                }
                Err(e) => {
                    let wait = self.node.retry_after().map_or(poll, |w| w.max(poll));
                    warn!(error = %e, wait_ms = wait.as_millis() as u64, "head query failed");
                    tokio::time::sleep(wait).await;
                }
            }
        }

        self.shutdown().await;
        self.set_state(IndexerState::Stopped);
        info!(last = cursor.height.saturating_sub(1), "ingestion stopped");
        Ok(())
    }

    /// Fetch, transform and commit one height, then hand off the side effects.
    pub async fn ingest(&self, height: u64) -> Result<Block, IndexerError> {
        let started = Instant::now();

        let raw = self
            .node
            .block(height)
            .await?
            .ok_or(IndexerError::BlockUnavailable { height })?;
        if raw.height != height {
            return Err(IndexerError::MalformedBlock {
                height,
                reason: format!("node returned height {}", raw.height),
            });
        }

        let prev_time = if height > 1 {
            self.store.block_timestamp(height - 1).await?
        } else {
            None
        };
        let block = transform_block(&raw, prev_time).ok_or_else(|| IndexerError::MalformedBlock {
            height,
            reason: "zero height".into(),
        })?;

        self.store.insert_block(&block).await?;

        if let Some(tx) = &self.validator_tx {
            if tx.send(height).await.is_err() {
                error!(height, "validator worker is gone, validators not reconciled");
            }
        }

        if let Some(notifier) = &self.notifier {
            for t in block.transactions.iter().filter(|t| t.tx_type == TxType::CreateCoin) {
                notifier.notify(t.clone());
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if self.config.debug {
            info!(height, txs = block.transactions.len(), hash = %block.hash, elapsed_ms, "block ingested");
        } else {
            trace!(height, txs = block.transactions.len(), hash = %block.hash, elapsed_ms, "block ingested");
        }
        Ok(block)
    }

    async fn ingest_with_retry(&self, height: u64) -> Result<Block, IndexerError> {
        let mut attempt = 0u32;
        loop {
            match self.ingest(height).await {
                Ok(block) => return Ok(block),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    let side = if e.is_node_side() { "node" } else { "store" };
                    if attempt >= self.config.retry.stall_after {
                        error!(height, attempt, side, error = %e, "height keeps failing");
                    } else if e.is_node_side() {
                        warn!(height, attempt, side, delay_ms = delay.as_millis() as u64, error = %e, "ingest failed, retrying");
                    } else {
                        error!(height, attempt, side, delay_ms = delay.as_millis() as u64, error = %e, "ingest failed, retrying");
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Retry a startup step until it succeeds or fails non-transiently.
    async fn retry_forever<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, IndexerError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, IndexerError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(step = what, attempt, delay_ms = delay.as_millis() as u64, error = %e, "startup step failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Backoff for `attempt`, stretched to cover an open circuit.
    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .retry
            .next_delay(attempt)
            .unwrap_or(self.retry.config.max_backoff);
        match self.node.retry_after() {
            Some(wait) => delay.max(wait),
            None => delay,
        }
    }

    fn spawn_workers(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.workers
            .push(tokio::spawn(pending.validator.run(pending.validator_rx)));
        if let Some(rx) = pending.coin_rx {
            let store = self.store.clone();
            self.workers.push(tokio::spawn(async move {
                let registered = run_coin_consumer(store, rx).await;
                debug!(registered, "coin consumer stopped");
            }));
        }
    }

    /// Close the queues and wait for the workers to drain them.
    async fn shutdown(&mut self) {
        self.validator_tx.take();
        self.notifier.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }

    fn set_state(&mut self, state: IndexerState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "indexer state");
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minterindex_core::RecordingCoinNotifier;
    use minterindex_storage::InMemoryStorage;

    use crate::builder::IndexerBuilder;
    use crate::test_utils::{block_json, create_coin_tx, send_tx, validator_entry, FakeNode};

    fn builder(node: &Arc<FakeNode>, store: &Arc<InMemoryStorage>) -> IndexerBuilder {
        IndexerBuilder::new()
            .node(node.clone())
            .store(store.clone())
            .poll_interval_ms(1)
            .retry_backoff_ms(1, 2)
    }

    #[tokio::test]
    async fn ingests_range_in_order_and_stops() {
        let node = Arc::new(FakeNode::with_chain(5));
        let store = Arc::new(InMemoryStorage::new());

        let mut ingestion = builder(&node, &store).to_height(5).build().unwrap();
        ingestion.run().await.unwrap();

        assert_eq!(ingestion.state(), IndexerState::Stopped);
        assert_eq!(store.heights(), vec![1, 2, 3, 4, 5]);
        assert_eq!(store.block(1).unwrap().block_time, 1.0);
        assert_eq!(store.block(2).unwrap().block_time, 5.0);
        assert!(store.block(3).unwrap().hash.starts_with("Mh"));
    }

    #[tokio::test]
    async fn resume_deletes_and_reingests_last_height() {
        let node = Arc::new(FakeNode::with_chain(4));
        let store = Arc::new(InMemoryStorage::new());

        builder(&node, &store).to_height(3).build().unwrap().run().await.unwrap();
        let before = store.block(3).unwrap();
        assert_eq!(node.block_calls(3), 1);

        builder(&node, &store).to_height(4).build().unwrap().run().await.unwrap();

        assert_eq!(store.heights(), vec![1, 2, 3, 4]);
        assert_eq!(node.block_calls(3), 2);
        assert_eq!(node.block_calls(2), 1);
        assert_eq!(store.block(3).unwrap(), before);
    }

    #[tokio::test]
    async fn to_height_below_stored_head_keeps_store_intact() {
        let node = Arc::new(FakeNode::with_chain(10));
        let store = Arc::new(InMemoryStorage::new());

        builder(&node, &store).to_height(10).build().unwrap().run().await.unwrap();
        let mut ingestion = builder(&node, &store).to_height(5).build().unwrap();
        ingestion.run().await.unwrap();

        assert_eq!(ingestion.state(), IndexerState::Stopped);
        assert_eq!(store.heights(), (1..=10).collect::<Vec<_>>());
        assert_eq!(node.block_calls(10), 1);
        assert_eq!(node.block_calls(5), 1);
    }

    #[tokio::test]
    async fn to_height_equal_to_stored_head_reingests_it() {
        let node = Arc::new(FakeNode::with_chain(3));
        let store = Arc::new(InMemoryStorage::new());

        builder(&node, &store).to_height(3).build().unwrap().run().await.unwrap();
        builder(&node, &store).to_height(3).build().unwrap().run().await.unwrap();

        assert_eq!(store.heights(), vec![1, 2, 3]);
        assert_eq!(node.block_calls(3), 2);
    }

    #[tokio::test]
    async fn second_run_is_rejected() {
        let node = Arc::new(FakeNode::with_chain(2));
        let store = Arc::new(InMemoryStorage::new());

        let mut ingestion = builder(&node, &store).to_height(2).build().unwrap();
        ingestion.run().await.unwrap();

        assert!(matches!(ingestion.run().await, Err(IndexerError::Config(_))));
        assert_eq!(node.block_calls(2), 1);
    }

    #[tokio::test]
    async fn starts_at_from_height_on_empty_store() {
        let node = Arc::new(FakeNode::with_chain(10));
        let store = Arc::new(InMemoryStorage::new());

        builder(&node, &store)
            .from_height(8)
            .to_height(10)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(store.heights(), vec![8, 9, 10]);
        // No stored predecessor for the first block.
        assert_eq!(store.block(8).unwrap().block_time, 5.0);
    }

    #[tokio::test]
    async fn transient_block_failure_is_retried_not_skipped() {
        let node = Arc::new(FakeNode::with_chain(3));
        node.fail_block(2, 3);
        let store = Arc::new(InMemoryStorage::new());

        builder(&node, &store).to_height(3).build().unwrap().run().await.unwrap();

        assert_eq!(store.heights(), vec![1, 2, 3]);
        assert_eq!(node.block_calls(2), 4);
    }

    #[tokio::test]
    async fn waits_for_head_to_advance() {
        let node = Arc::new(FakeNode::with_chain(4));
        node.set_head(2);
        let store = Arc::new(InMemoryStorage::new());

        let mut ingestion = builder(&node, &store).to_height(4).build().unwrap();
        let mover = {
            let node = node.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                node.set_head(4);
            })
        };
        ingestion.run().await.unwrap();
        mover.await.unwrap();

        assert_eq!(store.heights(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn validators_and_coins_are_written_before_stop_returns() {
        let node = Arc::new(FakeNode::new());
        node.put_block(block_json(1, vec![send_tx("Mt01")], None));
        node.put_block(block_json(2, vec![create_coin_tx("Mt02", "ABC")], None));
        node.put_validators(1, vec![validator_entry("Mp01", "100")]);
        node.put_validators(2, vec![validator_entry("Mp01", "200")]);
        node.set_head(2);
        let store = Arc::new(InMemoryStorage::new());

        builder(&node, &store).to_height(2).build().unwrap().run().await.unwrap();

        assert_eq!(store.validator_count(), 1);
        assert_eq!(store.link_count(), 2);
        assert_eq!(store.validator("Mp01").unwrap().record.total_stake, "200");
        assert_eq!(store.coin("ABC").unwrap().creation_tx_hash, "Mt02");
        assert_eq!(store.block(1).unwrap().transactions[0].payload, "x");
    }

    #[tokio::test]
    async fn custom_notifier_sees_create_coin_only() {
        let node = Arc::new(FakeNode::new());
        node.put_block(block_json(
            1,
            vec![send_tx("Mt01"), create_coin_tx("Mt02", "XYZ")],
            None,
        ));
        node.set_head(1);
        let store = Arc::new(InMemoryStorage::new());
        let recorder = RecordingCoinNotifier::new();

        builder(&node, &store)
            .to_height(1)
            .coin_notifier(Arc::new(recorder.clone()))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(recorder.hashes(), vec!["Mt02".to_string()]);
        assert_eq!(store.coin_count(), 0);
    }

    #[tokio::test]
    async fn unknown_event_does_not_block_ingestion() {
        let node = Arc::new(FakeNode::new());
        let events = vec![
            serde_json::json!({"type": "minter/RewardEvent", "value": {
                "role": "DAO", "address": "Mx01", "amount": "5", "validator_pub_key": "Mp01"}}),
            serde_json::json!({"type": "minter/SomethingNew", "value": {}}),
        ];
        node.put_block(block_json(1, vec![send_tx("Mt01")], Some(events)));
        node.set_head(1);
        let store = Arc::new(InMemoryStorage::new());

        builder(&node, &store).to_height(1).build().unwrap().run().await.unwrap();

        let block = store.block(1).unwrap();
        assert_eq!(block.rewards.len(), 1);
        assert!(block.slashes.is_empty());
        assert_eq!(block.transactions.len(), 1);
    }

    #[tokio::test]
    async fn wrong_or_zero_height_is_malformed_not_skipped() {
        let node = Arc::new(FakeNode::new());
        node.put_block_at(7, block_json(6, vec![], None));
        let mut zero = block_json(1, vec![], None);
        zero.height = 0;
        node.put_block_at(1, zero);
        let store = Arc::new(InMemoryStorage::new());

        let ingestion = builder(&node, &store).build().unwrap();
        assert!(matches!(
            ingestion.ingest(7).await,
            Err(IndexerError::MalformedBlock { height: 7, .. })
        ));
        assert!(matches!(
            ingestion.ingest(1).await,
            Err(IndexerError::MalformedBlock { height: 1, .. })
        ));
        assert!(matches!(
            ingestion.ingest(2).await,
            Err(IndexerError::BlockUnavailable { height: 2 })
        ));
        assert_eq!(store.block_count(), 0);
    }
}
