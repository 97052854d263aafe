//! Relational store interface.
//!
//! The highest stored block height is the indexer's only checkpoint: on
//! restart the loop reads it, deletes that block and re-ingests it.
//!
//! Implementations live in `minterindex-storage` (`InMemoryStorage`,
//! `SqliteStorage`, `PostgresStorage`).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::IndexerError;
use crate::types::{Block, Coin, Validator, ValidatorChange};

/// Storage operations used by the ingestion loop and its workers.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Highest stored block height, `0` for an empty store.
    async fn last_height(&self) -> Result<u64, IndexerError>;

    /// Time of the block at `height`, if stored.
    async fn block_timestamp(&self, height: u64) -> Result<Option<DateTime<Utc>>, IndexerError>;

    /// Atomically insert a block with its transactions, tags, rewards and
    /// slashes. Fails if the height already exists.
    async fn insert_block(&self, block: &Block) -> Result<(), IndexerError>;

    /// Delete the block at `height` and everything that hangs off it
    /// (transactions, tags, rewards, slashes, validator links).
    ///
    /// Returns `true` if a block was deleted.
    async fn delete_block(&self, height: u64) -> Result<bool, IndexerError>;

    /// Persisted validators for the given public keys; unknown keys are absent.
    async fn validators_by_pub_key(
        &self,
        public_keys: &[String],
    ) -> Result<HashMap<String, Validator>, IndexerError>;

    /// Apply reconciler decisions, returning each validator's id in the same
    /// order as `changes`.
    ///
    /// An insert that races with another writer for the same public key must
    /// turn into an update rather than a duplicate row.
    async fn apply_validator_changes(
        &self,
        changes: &[ValidatorChange],
    ) -> Result<Vec<i64>, IndexerError>;

    /// Link validators to the block at `height`. Existing links are kept.
    async fn link_block_validators(
        &self,
        height: u64,
        validator_ids: &[i64],
    ) -> Result<(), IndexerError>;

    /// Insert or refresh a coin keyed by its symbol.
    async fn upsert_coin(&self, coin: &Coin) -> Result<(), IndexerError>;
}
