//! Typed node API responses.
//!
//! Every endpoint wraps its payload in a `{code, log, result}` envelope. Older
//! node versions encode integers as JSON numbers, newer ones as decimal
//! strings; the helpers in [`num`] accept both.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ─── Envelope ────────────────────────────────────────────────────────────────

/// The `{code, log, result}` wrapper around every node response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: Option<String>,
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, turning a domain-level error into [`IndexerError::Node`].
    pub fn into_result(self) -> Result<T, IndexerError> {
        if self.code != 0 || self.log.is_some() {
            return Err(IndexerError::Node {
                code: self.code,
                log: self.log.unwrap_or_default(),
            });
        }
        self.result
            .ok_or_else(|| IndexerError::Decode("response envelope has no result".into()))
    }
}

// ─── status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    #[serde(with = "num::u64_any")]
    pub latest_block_height: u64,
    #[serde(default)]
    pub latest_block_time: Option<DateTime<Utc>>,
}

// ─── block/{height} ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResult {
    pub hash: String,
    #[serde(with = "num::u64_any")]
    pub height: u64,
    pub time: DateTime<Utc>,
    #[serde(rename = "num_txs", with = "num::u64_any", default)]
    pub tx_count: u64,
    #[serde(rename = "total_txs", with = "num::u64_any", default)]
    pub total_txs: u64,
    /// Block reward in pips (arbitrary precision decimal string).
    #[serde(default)]
    pub block_reward: String,
    #[serde(with = "num::u64_any", default)]
    pub size: u64,
    #[serde(default)]
    pub transactions: Vec<TransactionResult>,
    #[serde(default)]
    pub events: Option<Vec<EventResult>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    pub hash: String,
    pub from: String,
    #[serde(rename = "type", with = "num::u64_any")]
    pub tx_type: u64,
    #[serde(with = "num::u64_any", default)]
    pub nonce: u64,
    #[serde(with = "num::u64_any", default)]
    pub gas_price: u64,
    #[serde(default)]
    pub gas_coin: String,
    #[serde(with = "num::u64_any", default)]
    pub gas_used: u64,
    #[serde(with = "num::u64_any", default)]
    pub gas: u64,
    /// Base64-encoded user payload.
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub service_data: String,
    #[serde(default)]
    pub data: TransactionData,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    /// Present only when the transaction failed.
    #[serde(default)]
    pub log: Option<String>,
}

/// Type-dependent transaction body. Every field is optional because each
/// transaction type only fills in its own subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionData {
    pub coin: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub coin_to_sell: Option<String>,
    pub coin_to_buy: Option<String>,
    pub value_to_sell: Option<String>,
    pub value_to_buy: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "coin_symbol")]
    pub symbol: Option<String>,
    pub initial_amount: Option<String>,
    pub initial_reserve: Option<String>,
    #[serde(with = "num::opt_u64_any", default)]
    pub constant_reserve_ratio: Option<u64>,
    pub address: Option<String>,
    pub pub_key: Option<String>,
    #[serde(with = "num::opt_u64_any", default)]
    pub commission: Option<u64>,
    pub stake: Option<String>,
    pub proof: Option<String>,
    pub raw_check: Option<String>,
    #[serde(with = "num::opt_u64_any", default)]
    pub threshold: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResult {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: EventValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventValue {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub coin: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub validator_pub_key: String,
}

// ─── validators?height={h} ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorEntry {
    #[serde(default)]
    pub accumulated_reward: String,
    #[serde(with = "num::u64_any", default)]
    pub absent_times: u64,
    pub candidate: Candidate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_address: String,
    #[serde(default)]
    pub total_stake: String,
    pub pub_key: String,
    #[serde(with = "num::u64_any", default)]
    pub commission: u64,
    #[serde(with = "num::u64_any", default)]
    pub created_at_block: u64,
    #[serde(default)]
    pub status: u8,
}

// ─── Numeric helpers ─────────────────────────────────────────────────────────

/// Serde helpers for integers that may arrive as numbers or strings.
pub mod num {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(u64),
        Str(String),
    }

    fn parse<E: serde::de::Error>(v: NumOrStr) -> Result<u64, E> {
        match v {
            NumOrStr::Num(n) => Ok(n),
            NumOrStr::Str(s) if s.is_empty() => Ok(0),
            NumOrStr::Str(s) => s.parse::<u64>().map_err(E::custom),
        }
    }

    pub mod u64_any {
        use super::*;
        use serde::Serializer;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
            parse(NumOrStr::deserialize(d)?)
        }

        pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_u64(*v)
        }
    }

    pub mod opt_u64_any {
        use super::*;
        use serde::Serializer;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            Option::<NumOrStr>::deserialize(d)?.map(parse).transpose()
        }

        pub fn serialize<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
            match v {
                Some(n) => s.serialize_some(n),
                None => s.serialize_none(),
            }
        }
    }
}
