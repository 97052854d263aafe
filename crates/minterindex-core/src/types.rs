//! Persisted row types.
//!
//! A [`Block`] is the aggregate written in one store transaction: it owns its
//! transactions (which own their tags), rewards and slashes. Validators and
//! coins live outside the aggregate and are written by the workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tags::TxTag;

// ─── TxType ──────────────────────────────────────────────────────────────────

/// Transaction type as numbered by the node API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    Send,
    SellCoin,
    SellAllCoin,
    BuyCoin,
    CreateCoin,
    DeclareCandidacy,
    Delegate,
    Unbond,
    RedeemCheck,
    SetCandidateOnline,
    SetCandidateOffline,
    CreateMultisig,
    Multisend,
    EditCandidate,
    /// A type this indexer does not know about yet; mapped without overrides.
    Unknown(u64),
}

impl TxType {
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Send,
            2 => Self::SellCoin,
            3 => Self::SellAllCoin,
            4 => Self::BuyCoin,
            5 => Self::CreateCoin,
            6 => Self::DeclareCandidacy,
            7 => Self::Delegate,
            8 => Self::Unbond,
            9 => Self::RedeemCheck,
            10 => Self::SetCandidateOnline,
            11 => Self::SetCandidateOffline,
            12 => Self::CreateMultisig,
            13 => Self::Multisend,
            14 => Self::EditCandidate,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            Self::Send => 1,
            Self::SellCoin => 2,
            Self::SellAllCoin => 3,
            Self::BuyCoin => 4,
            Self::CreateCoin => 5,
            Self::DeclareCandidacy => 6,
            Self::Delegate => 7,
            Self::Unbond => 8,
            Self::RedeemCheck => 9,
            Self::SetCandidateOnline => 10,
            Self::SetCandidateOffline => 11,
            Self::CreateMultisig => 12,
            Self::Multisend => 13,
            Self::EditCandidate => 14,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::SellCoin => write!(f, "sell-coin"),
            Self::SellAllCoin => write!(f, "sell-all-coin"),
            Self::BuyCoin => write!(f, "buy-coin"),
            Self::CreateCoin => write!(f, "create-coin"),
            Self::DeclareCandidacy => write!(f, "declare-candidacy"),
            Self::Delegate => write!(f, "delegate"),
            Self::Unbond => write!(f, "unbond"),
            Self::RedeemCheck => write!(f, "redeem-check"),
            Self::SetCandidateOnline => write!(f, "set-candidate-online"),
            Self::SetCandidateOffline => write!(f, "set-candidate-offline"),
            Self::CreateMultisig => write!(f, "create-multisig"),
            Self::Multisend => write!(f, "multisend"),
            Self::EditCandidate => write!(f, "edit-candidate"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

// ─── Block aggregate ─────────────────────────────────────────────────────────

/// One block row plus everything that is deleted with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Height, unique. The resumption cursor.
    pub height: u64,
    /// `Mh`-prefixed lowercase hash.
    pub hash: String,
    /// Block time in nanoseconds since the epoch.
    pub timestamp: i64,
    pub tx_count: u64,
    pub size: u64,
    /// Seconds since the previous block (see [`crate::transform::inter_block_time`]).
    pub block_time: f64,
    /// Total reward in pips, decimal string.
    pub block_reward: String,
    pub created_at: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub rewards: Vec<Reward>,
    pub slashes: Vec<Slash>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub tx_type: TxType,
    pub nonce: u64,
    pub gas_price: u64,
    pub fee: u64,
    pub gas_coin: String,
    pub coin: Option<String>,
    pub coin_to_sell: Option<String>,
    pub coin_to_buy: Option<String>,
    pub payload: String,
    pub service_data: String,
    /// `true` when the node reported no error log.
    pub status: bool,
    pub value: Option<String>,
    pub value_to_sell: Option<String>,
    pub value_to_buy: Option<String>,
    pub stake: Option<String>,
    pub commission: Option<u64>,
    pub initial_amount: Option<String>,
    pub initial_reserve: Option<String>,
    pub constant_reserve_ratio: Option<u64>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub pub_key: Option<String>,
    pub proof: Option<String>,
    pub raw_check: Option<String>,
    pub threshold: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<TxTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub role: String,
    pub amount: String,
    pub address: String,
    pub validator_pk: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slash {
    pub coin: String,
    pub amount: String,
    pub address: String,
    pub validator_pk: String,
}

// ─── Validators ──────────────────────────────────────────────────────────────

/// Validator fields shared by new and persisted rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub public_key: String,
    pub name: Option<String>,
    pub address: String,
    pub total_stake: String,
    pub accumulated_reward: String,
    pub absent_times: u64,
    pub commission: u64,
    pub created_at_block: u64,
    pub status: u8,
}

/// A persisted validator row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: i64,
    #[serde(flatten)]
    pub record: ValidatorRecord,
}

/// What the reconciler decided to do with one validator-set entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorChange {
    Insert(ValidatorRecord),
    Update(Validator),
}

impl ValidatorChange {
    pub fn public_key(&self) -> &str {
        match self {
            Self::Insert(r) => &r.public_key,
            Self::Update(v) => &v.record.public_key,
        }
    }
}

// ─── Coins ───────────────────────────────────────────────────────────────────

/// A coin registered by a create-coin transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub symbol: String,
    pub name: Option<String>,
    pub constant_reserve_ratio: Option<u64>,
    pub initial_amount: Option<String>,
    pub initial_reserve: Option<String>,
    pub creator: String,
    pub creation_tx_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Coin {
    /// Build a coin from its defining transaction.
    ///
    /// Returns `None` for anything other than a successful create-coin
    /// transaction that carries a symbol.
    pub fn from_transaction(tx: &Transaction) -> Option<Self> {
        if tx.tx_type != TxType::CreateCoin || !tx.status {
            return None;
        }
        let symbol = tx.coin.clone().filter(|s| !s.is_empty())?;
        Some(Self {
            symbol,
            name: tx.name.clone(),
            constant_reserve_ratio: tx.constant_reserve_ratio,
            initial_amount: tx.initial_amount.clone(),
            initial_reserve: tx.initial_reserve.clone(),
            creator: tx.from.clone(),
            creation_tx_hash: tx.hash.clone(),
            created_at: tx.created_at,
        })
    }
}
