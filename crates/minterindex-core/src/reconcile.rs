//! Validator reconciler. Merges a validator-set response with the persisted
//! validators into insert/update decisions keyed by public key.

use std::collections::HashMap;

use crate::response::ValidatorEntry;
use crate::types::{Validator, ValidatorChange, ValidatorRecord};

/// Public keys referenced by a validator-set response, deduplicated, in
/// response order.
pub fn public_keys(entries: &[ValidatorEntry]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(e.candidate.pub_key.as_str()))
        .map(|e| e.candidate.pub_key.clone())
        .collect()
}

/// Decide, per public key, whether to insert a new validator or refresh an
/// existing one.
///
/// `existing` holds the persisted rows for (a superset of) the keys in
/// `entries`. Only stake, accumulated reward, absent times and status are
/// refreshed on an existing row; everything else is kept as first seen. A key
/// listed twice collapses into a single decision (last entry wins) so the
/// caller never links the same validator to a block twice.
pub fn reconcile(
    entries: &[ValidatorEntry],
    existing: &HashMap<String, Validator>,
) -> Vec<ValidatorChange> {
    let mut order: Vec<&str> = Vec::with_capacity(entries.len());
    let mut latest: HashMap<&str, &ValidatorEntry> = HashMap::with_capacity(entries.len());
    for entry in entries {
        let key = entry.candidate.pub_key.as_str();
        if latest.insert(key, entry).is_none() {
            order.push(key);
        }
    }

    order
        .into_iter()
        .filter_map(|key| latest.get(key).map(|entry| (key, *entry)))
        .map(|(key, entry)| match existing.get(key) {
            Some(current) => ValidatorChange::Update(refresh(current, entry)),
            None => ValidatorChange::Insert(new_record(entry)),
        })
        .collect()
}

fn new_record(entry: &ValidatorEntry) -> ValidatorRecord {
    let c = &entry.candidate;
    ValidatorRecord {
        public_key: c.pub_key.clone(),
        name: None,
        address: c.candidate_address.clone(),
        total_stake: c.total_stake.clone(),
        accumulated_reward: entry.accumulated_reward.clone(),
        absent_times: entry.absent_times,
        commission: c.commission,
        created_at_block: c.created_at_block,
        status: c.status,
    }
}

fn refresh(current: &Validator, entry: &ValidatorEntry) -> Validator {
    let mut updated = current.clone();
    updated.record.total_stake = entry.candidate.total_stake.clone();
    updated.record.accumulated_reward = entry.accumulated_reward.clone();
    updated.record.absent_times = entry.absent_times;
    updated.record.status = entry.candidate.status;
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Candidate;

    fn entry(pk: &str, stake: &str, status: u8) -> ValidatorEntry {
        ValidatorEntry {
            accumulated_reward: "10".into(),
            absent_times: 1,
            candidate: Candidate {
                candidate_address: format!("Mx{pk}"),
                total_stake: stake.into(),
                pub_key: pk.into(),
                commission: 10,
                created_at_block: 1,
                status,
            },
        }
    }

    fn persisted(id: i64, pk: &str) -> Validator {
        Validator {
            id,
            record: ValidatorRecord {
                public_key: pk.into(),
                name: Some("Named".into()),
                address: "MxOriginal".into(),
                total_stake: "1".into(),
                accumulated_reward: "0".into(),
                absent_times: 0,
                commission: 5,
                created_at_block: 1,
                status: 1,
            },
        }
    }

    #[test]
    fn unknown_key_is_inserted_without_name() {
        let changes = reconcile(&[entry("Mp01", "500", 2)], &HashMap::new());
        assert_eq!(changes.len(), 1);
        match &changes[0] {
            ValidatorChange::Insert(r) => {
                assert_eq!(r.public_key, "Mp01");
                assert_eq!(r.total_stake, "500");
                assert_eq!(r.name, None);
                assert_eq!(r.status, 2);
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn known_key_refreshes_mutable_fields_only() {
        let mut existing = HashMap::new();
        existing.insert("Mp01".to_string(), persisted(7, "Mp01"));
        let changes = reconcile(&[entry("Mp01", "900", 2)], &existing);
        match &changes[0] {
            ValidatorChange::Update(v) => {
                assert_eq!(v.id, 7);
                assert_eq!(v.record.total_stake, "900");
                assert_eq!(v.record.accumulated_reward, "10");
                assert_eq!(v.record.absent_times, 1);
                assert_eq!(v.record.status, 2);
                // immutable once set
                assert_eq!(v.record.address, "MxOriginal");
                assert_eq!(v.record.commission, 5);
                assert_eq!(v.record.name.as_deref(), Some("Named"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_key_collapses_last_wins() {
        let entries = [entry("Mp01", "1", 1), entry("Mp02", "2", 1), entry("Mp01", "3", 2)];
        let changes = reconcile(&entries, &HashMap::new());
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].public_key(), "Mp01");
        assert_eq!(changes[1].public_key(), "Mp02");
        match &changes[0] {
            ValidatorChange::Insert(r) => assert_eq!(r.total_stake, "3"),
            other => panic!("expected insert, got {other:?}"),
        }
        assert_eq!(public_keys(&entries), vec!["Mp01".to_string(), "Mp02".to_string()]);
    }
}
