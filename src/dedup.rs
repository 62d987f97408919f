use std::collections::HashMap;

use crate::models::{MergeResult, Transaction};

/// Merge `incoming` into `existing` keyed by id. On an id clash the stored
/// record is replaced only when the incoming one is dated later; every clash
/// counts as a duplicate whether or not it replaced anything.
pub fn merge(existing: &[Transaction], incoming: &[Transaction]) -> MergeResult {
    let mut by_id: HashMap<&str, &Transaction> = HashMap::with_capacity(existing.len() + incoming.len());
    let mut order: Vec<&str> = Vec::with_capacity(existing.len() + incoming.len());
    let mut duplicate_count = 0usize;

    for txn in existing {
        if by_id.insert(txn.id.as_str(), txn).is_none() {
            order.push(txn.id.as_str());
        }
    }

    for txn in incoming {
        match by_id.get_mut(txn.id.as_str()) {
            Some(stored) => {
                duplicate_count += 1;
                if txn.date > stored.date {
                    *stored = txn;
                }
            }
            None => {
                by_id.insert(txn.id.as_str(), txn);
                order.push(txn.id.as_str());
            }
        }
    }

    let merged = order
        .into_iter()
        .filter_map(|id| by_id.get(id).map(|t| (*t).clone()))
        .collect();

    MergeResult {
        merged,
        duplicate_count,
    }
}

/// Collapse records that share an id within a single collection.
pub fn dedupe(transactions: &[Transaction]) -> MergeResult {
    merge(&[], transactions)
}
