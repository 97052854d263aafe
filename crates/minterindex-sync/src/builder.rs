//! Fluent builder API for assembling an [`IngestionLoop`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use minterindex_node::{HttpNodeClient, NodeConfig};
//! use minterindex_storage::InMemoryStorage;
//! use minterindex_sync::IndexerBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let node = HttpNodeClient::new(NodeConfig::default())?;
//! let mut ingestion = IndexerBuilder::new()
//!     .node(Arc::new(node))
//!     .store(Arc::new(InMemoryStorage::new()))
//!     .from_height(1)
//!     .to_height(1_000)
//!     .build()?;
//! ingestion.run().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use minterindex_core::{ChainStore, CoinNotifier, IndexerConfig, IndexerError, NoopCoinNotifier};
use minterindex_node::{NodeApi, RetryConfig, RetryPolicy};
use minterindex_storage::InMemoryStorage;

use crate::coins::coin_channel;
use crate::index_loop::{IngestionLoop, PendingWorkers};
use crate::validators::ValidatorWorker;

/// Fluent builder for [`IndexerConfig`] and the collaborators of an
/// [`IngestionLoop`].
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
    node: Option<Arc<dyn NodeApi>>,
    store: Option<Arc<dyn ChainStore>>,
    notifier: Option<Arc<dyn CoinNotifier>>,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn with_config(config: IndexerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn node(mut self, node: Arc<dyn NodeApi>) -> Self {
        self.node = Some(node);
        self
    }

    /// Defaults to a fresh [`InMemoryStorage`].
    pub fn store(mut self, store: Arc<dyn ChainStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the queued coin registry with a custom notifier.
    pub fn coin_notifier(mut self, notifier: Arc<dyn CoinNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// First height to ingest into an empty store.
    pub fn from_height(mut self, height: u64) -> Self {
        self.config.from_height = height;
        self
    }

    /// Stop after this height.
    pub fn to_height(mut self, height: u64) -> Self {
        self.config.to_height = Some(height);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn validator_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.validator_queue_capacity = capacity;
        self
    }

    pub fn coin_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.coin_queue_capacity = capacity;
        self
    }

    pub fn validator_max_retries(mut self, retries: u32) -> Self {
        self.config.validator_max_retries = retries;
        self
    }

    /// Initial and maximum backoff for a failing height.
    pub fn retry_backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.config.retry.initial_backoff_ms = initial;
        self.config.retry.max_backoff_ms = max;
        self
    }

    pub fn register_coins(mut self, enabled: bool) -> Self {
        self.config.register_coins = enabled;
        self
    }

    /// Log every ingested block at `info`.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and wire the loop together. Workers are
    /// spawned when the loop starts running.
    pub fn build(self) -> Result<IngestionLoop, IndexerError> {
        self.config.validate()?;
        let node = self
            .node
            .ok_or_else(|| IndexerError::Config("no node client configured".into()))?;
        let store: Arc<dyn ChainStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));

        let (validator_tx, validator_rx) = mpsc::channel(self.config.validator_queue_capacity);
        let validator_retry = RetryPolicy::new(
            RetryConfig::from(&self.config.retry).bounded(self.config.validator_max_retries),
        );
        let validator = ValidatorWorker::new(node.clone(), store.clone(), validator_retry);

        let (notifier, coin_rx): (Arc<dyn CoinNotifier>, _) = match self.notifier {
            Some(custom) => (custom, None),
            None if self.config.register_coins => {
                let (queued, rx) = coin_channel(self.config.coin_queue_capacity);
                (Arc::new(queued), Some(rx))
            }
            None => (Arc::new(NoopCoinNotifier), None),
        };

        Ok(IngestionLoop::new(
            self.config,
            node,
            store,
            notifier,
            validator_tx,
            PendingWorkers {
                validator,
                validator_rx,
                coin_rx,
            },
        ))
    }
}
