//! Block transformer. Maps one node block response onto the persisted
//! [`Block`] aggregate.
//!
//! Everything here is pure: the caller supplies the predecessor's timestamp
//! and commits the result.

use chrono::{DateTime, Utc};

use crate::response::{BlockResult, EventResult, TransactionResult};
use crate::sanitize::{capitalize_first, sanitize_payload, strip_opt, strip_tags};
use crate::tags::{collect_tags, tag_value, TagKey};
use crate::types::{Block, Reward, Slash, Transaction, TxType};

/// Prefix prepended to every stored block hash.
pub const BLOCK_HASH_PREFIX: &str = "Mh";

/// Inter-block time recorded for the first block.
pub const FIRST_BLOCK_TIME: f64 = 1.0;

/// Inter-block time substituted when the delta cannot be trusted.
pub const FALLBACK_BLOCK_TIME: f64 = 5.0;

pub const REWARD_EVENT: &str = "minter/RewardEvent";
pub const SLASH_EVENT: &str = "minter/SlashEvent";

/// Transform a block response.
///
/// Returns `None` when the response reports height 0, which only a malformed
/// or empty response does.
pub fn transform_block(
    result: &BlockResult,
    prev_block_time: Option<DateTime<Utc>>,
) -> Option<Block> {
    if result.height == 0 {
        return None;
    }

    let transactions = result
        .transactions
        .iter()
        .map(|tx| transform_transaction(tx, result.time))
        .collect();

    let (rewards, slashes) = match &result.events {
        Some(events) => split_events(events),
        None => (Vec::new(), Vec::new()),
    };

    Some(Block {
        height: result.height,
        hash: format!("{BLOCK_HASH_PREFIX}{}", result.hash.to_lowercase()),
        timestamp: result.time.timestamp_nanos_opt().unwrap_or(i64::MAX),
        tx_count: result.tx_count,
        size: result.size,
        block_time: inter_block_time(result.height, result.time, prev_block_time),
        block_reward: result.block_reward.clone(),
        created_at: result.time,
        transactions,
        rewards,
        slashes,
    })
}

/// Seconds between this block and its predecessor.
///
/// Height 1 has no predecessor and gets [`FIRST_BLOCK_TIME`]. A negative delta
/// (clock skew) or an unknown predecessor gets [`FALLBACK_BLOCK_TIME`].
pub fn inter_block_time(
    height: u64,
    time: DateTime<Utc>,
    prev_block_time: Option<DateTime<Utc>>,
) -> f64 {
    if height == 1 {
        return FIRST_BLOCK_TIME;
    }
    let Some(prev) = prev_block_time else {
        return FALLBACK_BLOCK_TIME;
    };
    let delta = time.signed_duration_since(prev);
    if delta < chrono::Duration::zero() {
        return FALLBACK_BLOCK_TIME;
    }
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_seconds() as f64,
    }
}

/// Map one transaction, applying the type-specific derivations.
pub fn transform_transaction(tx: &TransactionResult, block_time: DateTime<Utc>) -> Transaction {
    let data = &tx.data;
    let tags = collect_tags(tx.tags.as_ref());
    let tx_type = TxType::from_code(tx.tx_type);

    let mut out = Transaction {
        hash: capitalize_first(&tx.hash),
        from: capitalize_first(&tx.from),
        to: data.to.clone(),
        tx_type,
        nonce: tx.nonce,
        gas_price: tx.gas_price,
        fee: tx.gas,
        gas_coin: tx.gas_coin.clone(),
        coin: strip_opt(data.coin.as_deref()),
        coin_to_sell: data.coin_to_sell.clone(),
        coin_to_buy: data.coin_to_buy.clone(),
        payload: sanitize_payload(&tx.payload),
        service_data: strip_tags(&tx.service_data),
        status: tx.log.is_none(),
        value: data.value.clone(),
        value_to_sell: None,
        value_to_buy: None,
        stake: data.stake.clone(),
        commission: data.commission,
        initial_amount: data.initial_amount.clone(),
        initial_reserve: data.initial_reserve.clone(),
        constant_reserve_ratio: data.constant_reserve_ratio,
        name: strip_opt(data.name.as_deref()),
        address: data.address.clone(),
        pub_key: data.pub_key.clone(),
        proof: data.proof.clone(),
        raw_check: data.raw_check.clone(),
        threshold: data.threshold,
        created_at: block_time,
        tags,
    };

    match tx_type {
        TxType::CreateCoin => {
            out.coin = data.symbol.clone();
        }
        TxType::SellCoin => {
            out.value_to_sell = data.value_to_sell.clone();
            out.value_to_buy = tag_value(&out.tags, &TagKey::Return);
        }
        TxType::SellAllCoin => {
            out.value_to_sell = tag_value(&out.tags, &TagKey::SellAmount);
            out.value_to_buy = tag_value(&out.tags, &TagKey::Return);
        }
        TxType::BuyCoin => {
            out.value_to_sell = tag_value(&out.tags, &TagKey::Return);
            out.value_to_buy = data.value_to_buy.clone();
        }
        _ => {}
    }

    out
}

/// Partition block events into rewards and slashes; unknown kinds are dropped.
pub fn split_events(events: &[EventResult]) -> (Vec<Reward>, Vec<Slash>) {
    let mut rewards = Vec::new();
    let mut slashes = Vec::new();

    for event in events {
        let v = &event.value;
        match event.kind.as_str() {
            REWARD_EVENT => rewards.push(Reward {
                role: v.role.clone(),
                amount: v.amount.clone(),
                address: v.address.clone(),
                validator_pk: v.validator_pub_key.clone(),
            }),
            SLASH_EVENT => slashes.push(Slash {
                coin: v.coin.clone(),
                amount: v.amount.clone(),
                address: v.address.clone(),
                validator_pk: v.validator_pub_key.clone(),
            }),
            other => tracing::trace!(kind = other, "dropping unrecognised block event"),
        }
    }

    (rewards, slashes)
}
