//! Transaction tag keys.
//!
//! The node attaches a free-form `key → value` map to each transaction. The
//! keys the transformer relies on are resolved into [`TagKey`] once, at the
//! transformation boundary; everything else is kept verbatim as
//! [`TagKey::Other`] so it can still be displayed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A recognised tag key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKey {
    Type,
    From,
    To,
    Coin,
    CoinToBuy,
    CoinToSell,
    /// Amount received by a sell / paid by a buy (`tx.return`).
    Return,
    /// Amount sold by a sell-all (`tx.sell_amount`).
    SellAmount,
    PubKey,
    CreatedMultisig,
    Other(String),
}

impl TagKey {
    pub fn parse(key: &str) -> Self {
        match key {
            "tx.type" => Self::Type,
            "tx.from" => Self::From,
            "tx.to" => Self::To,
            "tx.coin" => Self::Coin,
            "tx.coin_to_buy" => Self::CoinToBuy,
            "tx.coin_to_sell" => Self::CoinToSell,
            "tx.return" => Self::Return,
            "tx.sell_amount" => Self::SellAmount,
            "tx.pub_key" => Self::PubKey,
            "tx.created_multisig" => Self::CreatedMultisig,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Type => "tx.type",
            Self::From => "tx.from",
            Self::To => "tx.to",
            Self::Coin => "tx.coin",
            Self::CoinToBuy => "tx.coin_to_buy",
            Self::CoinToSell => "tx.coin_to_sell",
            Self::Return => "tx.return",
            Self::SellAmount => "tx.sell_amount",
            Self::PubKey => "tx.pub_key",
            Self::CreatedMultisig => "tx.created_multisig",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for TagKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TagKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TagKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Self::parse(&raw))
    }
}

/// A persisted transaction tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTag {
    pub key: TagKey,
    pub value: String,
}

/// Build the ordered tag list for a transaction.
///
/// The node hands tags over as an unordered map; sorting by the raw key keeps
/// re-ingestion of the same height byte-for-byte identical.
pub fn collect_tags(raw: Option<&HashMap<String, String>>) -> Vec<TxTag> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let mut tags: Vec<TxTag> = raw
        .iter()
        .map(|(k, v)| TxTag {
            key: TagKey::parse(k),
            value: v.clone(),
        })
        .collect();
    tags.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
    tags
}

/// First value stored under `key`, if any.
pub fn tag_value(tags: &[TxTag], key: &TagKey) -> Option<String> {
    tags.iter().find(|t| &t.key == key).map(|t| t.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_keys() {
        assert_eq!(TagKey::parse("tx.return"), TagKey::Return);
        assert_eq!(TagKey::parse("tx.sell_amount"), TagKey::SellAmount);
        let other = TagKey::parse("tx.some_future_tag");
        assert_eq!(other, TagKey::Other("tx.some_future_tag".into()));
        assert_eq!(other.as_str(), "tx.some_future_tag");
    }

    #[test]
    fn tags_sorted_and_looked_up() {
        let mut raw = HashMap::new();
        raw.insert("tx.type".to_string(), "03".to_string());
        raw.insert("tx.return".to_string(), "97".to_string());
        raw.insert("custom".to_string(), "x".to_string());
        let tags = collect_tags(Some(&raw));
        let keys: Vec<_> = tags.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["custom", "tx.return", "tx.type"]);
        assert_eq!(tag_value(&tags, &TagKey::Return).as_deref(), Some("97"));
        assert_eq!(tag_value(&tags, &TagKey::SellAmount), None);
    }

    #[test]
    fn missing_tag_map_is_empty() {
        assert!(collect_tags(None).is_empty());
    }

    #[test]
    fn tag_key_serializes_as_raw_string() {
        let json = serde_json::to_string(&TxTag { key: TagKey::Return, value: "1".into() }).unwrap();
        assert_eq!(json, r#"{"key":"tx.return","value":"1"}"#);
    }
}
