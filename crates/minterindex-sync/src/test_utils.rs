//! Scripted in-process node for loop and worker tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use minterindex_core::response::{BlockResult, ValidatorEntry};
use minterindex_core::IndexerError;
use minterindex_node::NodeApi;

/// Base time of block 1 (unix seconds). Block `h` is 5 s later than `h - 1`.
pub const GENESIS_SECS: i64 = 1_600_000_000;

#[derive(Default)]
pub struct FakeNode {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, BlockResult>>,
    validators: Mutex<HashMap<u64, Vec<ValidatorEntry>>>,
    /// Remaining transport failures per height for `block()`.
    block_failures: Mutex<HashMap<u64, u32>>,
    /// Remaining transport failures per height for `validators()`.
    validator_failures: Mutex<HashMap<u64, u32>>,
    block_calls: Mutex<HashMap<u64, u32>>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain of `n` empty blocks with head at `n`.
    pub fn with_chain(n: u64) -> Self {
        let node = Self::new();
        for h in 1..=n {
            node.put_block(block_json(h, vec![], None));
        }
        node.set_head(n);
        node
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn put_block(&self, block: BlockResult) {
        self.blocks.lock().unwrap().insert(block.height, block);
    }

    /// Serve `block` for `height` regardless of the height it reports.
    pub fn put_block_at(&self, height: u64, block: BlockResult) {
        self.blocks.lock().unwrap().insert(height, block);
    }

    pub fn put_validators(&self, height: u64, entries: Vec<ValidatorEntry>) {
        self.validators.lock().unwrap().insert(height, entries);
    }

    pub fn fail_block(&self, height: u64, times: u32) {
        self.block_failures.lock().unwrap().insert(height, times);
    }

    pub fn fail_validators(&self, height: u64, times: u32) {
        self.validator_failures.lock().unwrap().insert(height, times);
    }

    pub fn block_calls(&self, height: u64) -> u32 {
        self.block_calls.lock().unwrap().get(&height).copied().unwrap_or(0)
    }

    fn take_failure(map: &Mutex<HashMap<u64, u32>>, height: u64) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(&height) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl NodeApi for FakeNode {
    async fn status(&self) -> Result<u64, IndexerError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block(&self, height: u64) -> Result<Option<BlockResult>, IndexerError> {
        *self.block_calls.lock().unwrap().entry(height).or_default() += 1;
        if Self::take_failure(&self.block_failures, height) {
            return Err(IndexerError::Transport("connection reset".into()));
        }
        Ok(self.blocks.lock().unwrap().get(&height).cloned())
    }

    async fn validators(&self, height: u64) -> Result<Vec<ValidatorEntry>, IndexerError> {
        if Self::take_failure(&self.validator_failures, height) {
            return Err(IndexerError::Transport("timeout".into()));
        }
        Ok(self
            .validators
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }
}

/// A block response as the node would send it.
pub fn block_json(
    height: u64,
    transactions: Vec<serde_json::Value>,
    events: Option<Vec<serde_json::Value>>,
) -> BlockResult {
    let time = chrono::DateTime::from_timestamp(GENESIS_SECS + (height as i64 - 1) * 5, 0)
        .unwrap()
        .to_rfc3339();
    serde_json::from_value(json!({
        "hash": format!("{height:064X}"),
        "height": height.to_string(),
        "time": time,
        "num_txs": transactions.len().to_string(),
        "total_txs": "0",
        "block_reward": "333000000000000000000",
        "size": "1024",
        "transactions": transactions,
        "events": events,
    }))
    .unwrap()
}

pub fn create_coin_tx(hash: &str, symbol: &str) -> serde_json::Value {
    json!({
        "hash": hash,
        "from": "Mx7633980c000139dd3bd24a3f54e06474fa941e16",
        "nonce": "1",
        "gas_price": "1",
        "type": 5,
        "data": {
            "name": "Test <b>Coin</b>",
            "coin_symbol": symbol,
            "initial_amount": "1000000000000000000000",
            "initial_reserve": "10000000000000000000000",
            "constant_reserve_ratio": "50"
        },
        "payload": "",
        "service_data": "",
        "gas": "1000",
        "gas_coin": "BIP",
        "tags": {"tx.type": "05", "tx.coin": symbol}
    })
}

pub fn send_tx(hash: &str) -> serde_json::Value {
    json!({
        "hash": hash,
        "from": "Mx7633980c000139dd3bd24a3f54e06474fa941e16",
        "nonce": "2",
        "gas_price": "1",
        "type": 1,
        "data": {"coin": "BIP", "to": "Mxd82558ea00eb81d35f2654953598f5d51737d31d", "value": "10"},
        "payload": "PGI+eDwvYj4=",
        "service_data": "",
        "gas": "10",
        "gas_coin": "BIP",
        "tags": {"tx.type": "01"}
    })
}

pub fn validator_entry(pub_key: &str, stake: &str) -> ValidatorEntry {
    serde_json::from_value(json!({
        "accumulated_reward": "100",
        "absent_times": "0",
        "candidate": {
            "candidate_address": format!("Mx{pub_key}"),
            "total_stake": stake,
            "pub_key": pub_key,
            "commission": "10",
            "created_at_block": "1",
            "status": 2
        }
    }))
    .unwrap()
}
