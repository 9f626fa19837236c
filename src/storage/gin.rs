//! GIN (generalized inverted) index over a `Jsonb` column (C4).
//!
//! Maintains `(json-path, leaf-value) -> sorted row-id posting list`.
//! Paths are built lazily: a path only gets postings once it becomes
//! "active" — declared eagerly in the schema, or demanded by a query.
//! Activating a path mid-life triggers a backfill over the table's
//! current rows before the demanding query runs (spec.md §4.2).

use crate::value::{json_leaf_at_path, JsonPath, Row, Value};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct GinIndex {
    /// The `Jsonb` column this index is built over.
    column: usize,
    active_paths: BTreeSet<JsonPath>,
    /// `path -> (leaf value -> sorted row-ids)`.
    postings: BTreeMap<JsonPath, BTreeMap<Value, BTreeSet<u64>>>,
}

impl GinIndex {
    pub fn new(column: usize) -> Self {
        GinIndex {
            column,
            active_paths: BTreeSet::new(),
            postings: BTreeMap::new(),
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn is_active(&self, path: &JsonPath) -> bool {
        self.active_paths.contains(path)
    }

    pub fn active_paths(&self) -> impl Iterator<Item = &JsonPath> {
        self.active_paths.iter()
    }

    /// Activate `path`, backfilling postings from every row currently in
    /// `rows`. No-op if already active.
    pub fn activate<'a>(&mut self, path: JsonPath, rows: impl Iterator<Item = &'a Row>) {
        if !self.active_paths.insert(path.clone()) {
            return;
        }
        for row in rows {
            if let Some(json) = row.get(self.column) {
                self.index_row(&path, json, row.id);
            }
        }
    }

    /// Called on insert: index `row`'s `Jsonb` column at every active path.
    pub fn on_insert(&mut self, row: &Row) {
        let Some(json) = row.get(self.column) else {
            return;
        };
        let paths: Vec<JsonPath> = self.active_paths.iter().cloned().collect();
        for path in paths {
            self.index_row(&path, json, row.id);
        }
    }

    /// Called on delete: remove `row`'s postings at every active path.
    pub fn on_delete(&mut self, row: &Row) {
        let Some(json) = row.get(self.column) else {
            return;
        };
        let paths: Vec<JsonPath> = self.active_paths.iter().cloned().collect();
        for path in paths {
            self.unindex_row(&path, json, row.id);
        }
    }

    /// Called on update: drop the old leaf's posting, add the new one.
    pub fn on_update(&mut self, old_row: &Row, new_row: &Row) {
        self.on_delete(old_row);
        self.on_insert(new_row);
    }

    fn index_row(&mut self, path: &JsonPath, json: &Value, row_id: u64) {
        if let Value::Jsonb(tree) = json {
            if let Some(leaf) = json_leaf_at_path(tree, path) {
                self.postings
                    .entry(path.clone())
                    .or_default()
                    .entry(leaf)
                    .or_default()
                    .insert(row_id);
            }
        }
    }

    fn unindex_row(&mut self, path: &JsonPath, json: &Value, row_id: u64) {
        if let Value::Jsonb(tree) = json {
            if let Some(leaf) = json_leaf_at_path(tree, path) {
                if let Some(by_leaf) = self.postings.get_mut(path) {
                    if let Some(set) = by_leaf.get_mut(&leaf) {
                        set.remove(&row_id);
                        if set.is_empty() {
                            by_leaf.remove(&leaf);
                        }
                    }
                }
            }
        }
    }

    /// Sorted posting list for a single-path equality predicate.
    pub fn get(&self, path: &JsonPath, value: &Value) -> Vec<u64> {
        self.postings
            .get(path)
            .and_then(|by_leaf| by_leaf.get(value))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn posting_len(&self, path: &JsonPath, value: &Value) -> usize {
        self.postings
            .get(path)
            .and_then(|by_leaf| by_leaf.get(value))
            .map(BTreeSet::len)
            .unwrap_or(0)
    }

    /// Sorted intersection of postings for several `(path, value)`
    /// conjuncts on the same column (`GinIndexScanMulti`).
    pub fn get_multi(&self, conjuncts: &[(JsonPath, Value)]) -> Vec<u64> {
        let mut lists: Vec<Vec<u64>> = conjuncts
            .iter()
            .map(|(p, v)| self.get(p, v))
            .collect();
        lists.sort_by_key(Vec::len);
        let Some((first, rest)) = lists.split_first() else {
            return Vec::new();
        };
        let mut acc: BTreeSet<u64> = first.iter().copied().collect();
        for list in rest {
            let set: BTreeSet<u64> = list.iter().copied().collect();
            acc = acc.intersection(&set).copied().collect();
        }
        acc.into_iter().collect()
    }
}
