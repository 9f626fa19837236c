//! Ordered (B-tree-like) secondary index (C4).
//!
//! Maps key -> sorted set of row-ids. Backed by `BTreeMap` for the
//! asymptotics spec.md §4.1/§4.2 require (O(log n) point lookup, O(log n +
//! k) range scan); the contract is the asymptotic behavior, not a specific
//! tree implementation. A nullable column's `Null` values never contribute
//! a posting here (spec.md §3); [`UniqueIndex`] is the variant that also
//! allows at most one `Null`.

use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// A non-unique ordered index over one column.
#[derive(Debug, Clone, Default)]
pub struct OrderedIndex {
    postings: BTreeMap<Value, BTreeSet<u64>>,
}

impl OrderedIndex {
    pub fn new() -> Self {
        OrderedIndex::default()
    }

    /// Insert a posting; no-op for `Null` keys (callers should not call
    /// this for null column values, but it's safe either way).
    pub fn insert(&mut self, key: Value, row_id: u64) {
        if key.is_null() {
            return;
        }
        self.postings.entry(key).or_default().insert(row_id);
    }

    pub fn remove(&mut self, key: &Value, row_id: u64) {
        if key.is_null() {
            return;
        }
        if let Some(set) = self.postings.get_mut(key) {
            set.remove(&row_id);
            if set.is_empty() {
                self.postings.remove(key);
            }
        }
    }

    /// Point-get: ordered row-ids for an exact key.
    pub fn get(&self, key: &Value) -> Vec<u64> {
        self.postings
            .get(key)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Inclusive range scan `[lo, hi]`.
    pub fn range(&self, lo: &Value, hi: &Value) -> Vec<u64> {
        self.postings
            .range(lo.clone()..=hi.clone())
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Half-open range scan `[lo, hi)`.
    pub fn range_exclusive_hi(&self, lo: &Value, hi: &Value) -> Vec<u64> {
        self.postings
            .range(lo.clone()..hi.clone())
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// General range scan with independently optional, independently
    /// inclusive/exclusive bounds on either side (an absent bound is
    /// unbounded on that side). Used for `lt`/`lte`/`gt`/`gte` predicates,
    /// where only one side of the range is constrained.
    pub fn range_bounds(
        &self,
        lo: Option<&Value>,
        lo_inclusive: bool,
        hi: Option<&Value>,
        hi_inclusive: bool,
    ) -> Vec<u64> {
        let lo_bound = match lo {
            Some(v) if lo_inclusive => Bound::Included(v.clone()),
            Some(v) => Bound::Excluded(v.clone()),
            None => Bound::Unbounded,
        };
        let hi_bound = match hi {
            Some(v) if hi_inclusive => Bound::Included(v.clone()),
            Some(v) => Bound::Excluded(v.clone()),
            None => Bound::Unbounded,
        };
        self.postings
            .range((lo_bound, hi_bound))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Ordered, de-duplicated union of point-gets for each key in `keys`
    /// (for `IN (...)`).
    pub fn in_list(&self, keys: &[Value]) -> Vec<u64> {
        let mut set = BTreeSet::new();
        for key in keys {
            if let Some(ids) = self.postings.get(key) {
                set.extend(ids.iter().copied());
            }
        }
        set.into_iter().collect()
    }

    /// Number of rows indexed for `key` — used by the optimizer as a
    /// selectivity proxy when choosing between equally-kinded indexes.
    pub fn posting_len(&self, key: &Value) -> usize {
        self.postings.get(key).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.postings.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

/// A unique ordered index: at most one row-id per key, at most one `Null`.
#[derive(Debug, Clone, Default)]
pub struct UniqueIndex {
    postings: BTreeMap<Value, u64>,
    null_row: Option<u64>,
}

impl UniqueIndex {
    pub fn new() -> Self {
        UniqueIndex::default()
    }

    /// Returns `Err(existing_row_id)` if `key` already has an entry.
    pub fn try_insert(&mut self, key: Value, row_id: u64) -> Result<(), u64> {
        if key.is_null() {
            if let Some(existing) = self.null_row {
                return Err(existing);
            }
            self.null_row = Some(row_id);
            return Ok(());
        }
        if let Some(&existing) = self.postings.get(&key) {
            return Err(existing);
        }
        self.postings.insert(key, row_id);
        Ok(())
    }

    pub fn remove(&mut self, key: &Value, row_id: u64) {
        if key.is_null() {
            if self.null_row == Some(row_id) {
                self.null_row = None;
            }
            return;
        }
        if self.postings.get(key) == Some(&row_id) {
            self.postings.remove(key);
        }
    }

    pub fn get(&self, key: &Value) -> Option<u64> {
        if key.is_null() {
            return self.null_row;
        }
        self.postings.get(key).copied()
    }

    pub fn range(&self, lo: &Value, hi: &Value) -> Vec<u64> {
        self.postings
            .range(lo.clone()..=hi.clone())
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn in_list(&self, keys: &[Value]) -> Vec<u64> {
        let mut ids: Vec<u64> = keys.iter().filter_map(|k| self.get(k)).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn len(&self) -> usize {
        self.postings.len() + usize::from(self.null_row.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn ordered_index_range_and_point() {
        let mut idx = OrderedIndex::new();
        for i in 0..10 {
            idx.insert(Value::Int64(i), i as u64);
        }
        assert_eq!(idx.get(&Value::Int64(5)), vec![5]);
        assert_eq!(idx.range(&Value::Int64(2), &Value::Int64(4)), vec![2, 3, 4]);
    }

    #[test]
    fn ordered_index_null_is_not_posted() {
        let mut idx = OrderedIndex::new();
        idx.insert(Value::Null, 1);
        assert!(idx.is_empty());
    }

    #[test]
    fn ordered_index_in_list_dedups_and_orders() {
        let mut idx = OrderedIndex::new();
        idx.insert(Value::Int64(3), 1);
        idx.insert(Value::Int64(3), 2);
        idx.insert(Value::Int64(7), 3);
        let mut got = idx.in_list(&[Value::Int64(7), Value::Int64(3), Value::Int64(3)]);
        got.sort_unstable();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn unique_index_rejects_duplicate_key() {
        let mut idx = UniqueIndex::new();
        idx.try_insert(Value::Int64(1), 10).unwrap();
        assert_eq!(idx.try_insert(Value::Int64(1), 20), Err(10));
    }

    #[test]
    fn unique_index_allows_one_null() {
        let mut idx = UniqueIndex::new();
        idx.try_insert(Value::Null, 1).unwrap();
        assert_eq!(idx.try_insert(Value::Null, 2), Err(1));
    }
}
