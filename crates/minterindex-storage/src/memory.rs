//! In-memory storage backend.
//!
//! Keeps blocks, validators, links and coins in RAM behind one mutex.
//! Useful for tests and dry runs that don't need persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use minterindex_core::error::IndexerError;
use minterindex_core::store::ChainStore;
use minterindex_core::types::{Block, Coin, Validator, ValidatorChange, ValidatorRecord};

#[derive(Default)]
struct Tables {
    blocks: BTreeMap<u64, Block>,
    validators: BTreeMap<i64, Validator>,
    validator_ids: HashMap<String, i64>,
    next_validator_id: i64,
    links: BTreeSet<(u64, i64)>,
    coins: BTreeMap<String, Coin>,
}

/// In-memory chain store. All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, height: u64) -> Option<Block> {
        self.tables.lock().unwrap().blocks.get(&height).cloned()
    }

    /// Stored heights in ascending order.
    pub fn heights(&self) -> Vec<u64> {
        self.tables.lock().unwrap().blocks.keys().copied().collect()
    }

    pub fn block_count(&self) -> usize {
        self.tables.lock().unwrap().blocks.len()
    }

    pub fn validator(&self, public_key: &str) -> Option<Validator> {
        let tables = self.tables.lock().unwrap();
        let id = tables.validator_ids.get(public_key)?;
        tables.validators.get(id).cloned()
    }

    pub fn validator_count(&self) -> usize {
        self.tables.lock().unwrap().validators.len()
    }

    /// Validator ids linked to the block at `height`.
    pub fn links_for(&self, height: u64) -> Vec<i64> {
        self.tables
            .lock()
            .unwrap()
            .links
            .range((height, i64::MIN)..=(height, i64::MAX))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn link_count(&self) -> usize {
        self.tables.lock().unwrap().links.len()
    }

    pub fn coin(&self, symbol: &str) -> Option<Coin> {
        self.tables.lock().unwrap().coins.get(symbol).cloned()
    }

    pub fn coin_count(&self) -> usize {
        self.tables.lock().unwrap().coins.len()
    }
}

#[async_trait]
impl ChainStore for InMemoryStorage {
    async fn last_height(&self) -> Result<u64, IndexerError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.blocks.keys().next_back().copied().unwrap_or(0))
    }

    async fn block_timestamp(&self, height: u64) -> Result<Option<DateTime<Utc>>, IndexerError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .blocks
            .get(&height)
            .map(|b| b.created_at))
    }

    async fn insert_block(&self, block: &Block) -> Result<(), IndexerError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.blocks.contains_key(&block.height) {
            return Err(IndexerError::Storage(format!(
                "block {} already exists",
                block.height
            )));
        }
        tables.blocks.insert(block.height, block.clone());
        Ok(())
    }

    async fn delete_block(&self, height: u64) -> Result<bool, IndexerError> {
        let mut tables = self.tables.lock().unwrap();
        let existed = tables.blocks.remove(&height).is_some();
        tables.links.retain(|(h, _)| *h != height);
        Ok(existed)
    }

    async fn validators_by_pub_key(
        &self,
        public_keys: &[String],
    ) -> Result<HashMap<String, Validator>, IndexerError> {
        let tables = self.tables.lock().unwrap();
        Ok(public_keys
            .iter()
            .filter_map(|pk| {
                let id = tables.validator_ids.get(pk)?;
                let v = tables.validators.get(id)?;
                Some((pk.clone(), v.clone()))
            })
            .collect())
    }

    async fn apply_validator_changes(
        &self,
        changes: &[ValidatorChange],
    ) -> Result<Vec<i64>, IndexerError> {
        let mut tables = self.tables.lock().unwrap();
        let mut ids = Vec::with_capacity(changes.len());

        for change in changes {
            let id = match change {
                ValidatorChange::Insert(record) => {
                    match tables.validator_ids.get(&record.public_key).copied() {
                        // Someone else inserted it first: refresh instead.
                        Some(id) => {
                            if let Some(existing) = tables.validators.get_mut(&id) {
                                refresh(&mut existing.record, record);
                            }
                            id
                        }
                        None => {
                            tables.next_validator_id += 1;
                            let id = tables.next_validator_id;
                            tables.validator_ids.insert(record.public_key.clone(), id);
                            tables.validators.insert(
                                id,
                                Validator {
                                    id,
                                    record: record.clone(),
                                },
                            );
                            id
                        }
                    }
                }
                ValidatorChange::Update(v) => {
                    let existing = tables.validators.get_mut(&v.id).ok_or_else(|| {
                        IndexerError::Storage(format!("validator {} does not exist", v.id))
                    })?;
                    refresh(&mut existing.record, &v.record);
                    v.id
                }
            };
            ids.push(id);
        }
        Ok(ids)
    }

    async fn link_block_validators(
        &self,
        height: u64,
        validator_ids: &[i64],
    ) -> Result<(), IndexerError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.blocks.contains_key(&height) {
            return Err(IndexerError::Storage(format!("block {height} does not exist")));
        }
        for id in validator_ids {
            if !tables.validators.contains_key(id) {
                return Err(IndexerError::Storage(format!("validator {id} does not exist")));
            }
            tables.links.insert((height, *id));
        }
        Ok(())
    }

    async fn upsert_coin(&self, coin: &Coin) -> Result<(), IndexerError> {
        self.tables
            .lock()
            .unwrap()
            .coins
            .insert(coin.symbol.clone(), coin.clone());
        Ok(())
    }
}

/// Copy the fields that change between validator-set responses.
fn refresh(target: &mut ValidatorRecord, source: &ValidatorRecord) {
    target.total_stake = source.total_stake.clone();
    target.accumulated_reward = source.accumulated_reward.clone();
    target.absent_times = source.absent_times;
    target.status = source.status;
}
