//! Row store and index subsystem (C3/C4).
//!
//! A [`Table`] owns a dense row-id -> [`Row`] mapping plus every secondary
//! index declared on it (ordered, unique, GIN), and keeps them in lock-step
//! on every mutation so the invariants in spec.md §3/§8 hold outside an
//! in-progress mutation: primary-key and unique-index values are unique
//! and non-null (except one allowed null per unique index); every
//! secondary index's postings exactly reflect the live row set; row-ids
//! referenced by an index always exist in the row store.

pub mod gin;
pub mod ordered_index;

pub use gin::GinIndex;
pub use ordered_index::{OrderedIndex, UniqueIndex};

use crate::changelog::TableDelta;
use crate::error::{SchemaError, ValidationError};
use crate::schema::{IndexKind, TableSchema};
use crate::value::{JsonPath, Row, Value};
use std::collections::BTreeMap;

/// One table's live rows plus its indexes.
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<u64, Row>,
    next_id: u64,
    /// Implicit unique index over the primary-key column.
    pk_index: UniqueIndex,
    unique_indexes: std::collections::HashMap<String, UniqueIndex>,
    ordered_indexes: std::collections::HashMap<String, OrderedIndex>,
    gin_indexes: std::collections::HashMap<String, GinIndex>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        let mut unique_indexes = std::collections::HashMap::new();
        let mut ordered_indexes = std::collections::HashMap::new();
        let mut gin_indexes = std::collections::HashMap::new();
        for idx in &schema.indexes {
            let col = schema
                .column_index(&idx.column)
                .expect("validated at schema construction");
            match idx.kind {
                IndexKind::Ordered => {
                    ordered_indexes.insert(idx.name.clone(), OrderedIndex::new());
                }
                IndexKind::Unique => {
                    unique_indexes.insert(idx.name.clone(), UniqueIndex::new());
                }
                IndexKind::Gin => {
                    let mut gin = GinIndex::new(col);
                    for path in idx.eager_paths.clone() {
                        gin.activate(path, std::iter::empty());
                    }
                    gin_indexes.insert(idx.name.clone(), gin);
                }
            }
        }
        Table {
            schema,
            rows: BTreeMap::new(),
            next_id: 1,
            pk_index: UniqueIndex::new(),
            unique_indexes,
            ordered_indexes,
            gin_indexes,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, id: u64) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn scan(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn ordered_index(&self, name: &str) -> Option<&OrderedIndex> {
        self.ordered_indexes.get(name)
    }

    pub fn unique_index(&self, name: &str) -> Option<&UniqueIndex> {
        self.unique_indexes.get(name)
    }

    pub fn gin_index(&self, name: &str) -> Option<&GinIndex> {
        self.gin_indexes.get(name)
    }

    pub fn pk_index(&self) -> &UniqueIndex {
        &self.pk_index
    }

    /// Ensure `path` is active on GIN index `name`, backfilling from the
    /// current row set if this is the first time it has been demanded.
    pub fn ensure_gin_path(&mut self, name: &str, path: JsonPath) -> Result<(), SchemaError> {
        let gin = self
            .gin_indexes
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: self.schema.name.clone(),
                column: name.to_string(),
            })?;
        if !gin.is_active(&path) {
            gin.activate(path, self.rows.values());
        }
        Ok(())
    }

    fn validate_value(&self, col_idx: usize, value: &Value) -> Result<(), ValidationError> {
        let col = &self.schema.columns[col_idx];
        if value.is_null() {
            if !col.nullable {
                return Err(ValidationError::NotNullViolation {
                    column: col.name.clone(),
                });
            }
            return Ok(());
        }
        if !value.matches_type(col.data_type) {
            return Err(ValidationError::TypeMismatch {
                column: col.name.clone(),
                expected: col.data_type.to_string(),
                got: value
                    .data_type()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "Null".to_string()),
            });
        }
        Ok(())
    }

    fn validate_row_values(&self, values: &[Value]) -> Result<(), ValidationError> {
        for (i, v) in values.iter().enumerate() {
            self.validate_value(i, v)?;
        }
        Ok(())
    }

    /// Check that `values` would not collide with any unique constraint
    /// (primary key or declared unique index), given rows already staged
    /// in this same batch (`batch_so_far`). Does not mutate anything.
    fn check_unique_constraints(
        &self,
        values: &[Value],
        batch_pk_seen: &std::collections::HashSet<Value>,
        batch_unique_seen: &std::collections::HashMap<String, std::collections::HashSet<Value>>,
    ) -> Result<(), ValidationError> {
        let pk_val = &values[self.schema.primary_key_index()];
        if self.pk_index.get(pk_val).is_some() || batch_pk_seen.contains(pk_val) {
            return Err(ValidationError::UniqueViolation {
                index: format!("{}_pkey", self.schema.name),
                value: pk_val.to_string(),
            });
        }
        for idx in &self.schema.indexes {
            if idx.kind != IndexKind::Unique {
                continue;
            }
            let col = self.schema.column_index(&idx.column).expect("validated");
            let val = &values[col];
            if val.is_null() {
                continue;
            }
            let existing = self.unique_indexes[&idx.name].get(val).is_some();
            let in_batch = batch_unique_seen
                .get(&idx.name)
                .map(|s| s.contains(val))
                .unwrap_or(false);
            if existing || in_batch {
                return Err(ValidationError::UniqueViolation {
                    index: idx.name.clone(),
                    value: val.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Insert a batch of rows atomically: either all rows are validated,
    /// indexed, and committed, or none are (spec.md §4.1).
    pub fn insert(&mut self, batch: Vec<Vec<Value>>) -> Result<TableDelta, ValidationError> {
        let mut batch_pk_seen = std::collections::HashSet::new();
        let mut batch_unique_seen: std::collections::HashMap<
            String,
            std::collections::HashSet<Value>,
        > = std::collections::HashMap::new();

        for values in &batch {
            self.validate_row_values(values)?;
            self.check_unique_constraints(values, &batch_pk_seen, &batch_unique_seen)?;
            batch_pk_seen.insert(values[self.schema.primary_key_index()].clone());
            for idx in &self.schema.indexes {
                if idx.kind != IndexKind::Unique {
                    continue;
                }
                let col = self.schema.column_index(&idx.column).expect("validated");
                let val = &values[col];
                if !val.is_null() {
                    batch_unique_seen
                        .entry(idx.name.clone())
                        .or_default()
                        .insert(val.clone());
                }
            }
        }

        let mut delta = TableDelta::new(self.schema.name.clone());
        for values in batch {
            let id = self.next_id;
            self.next_id += 1;
            let row = Row::new(id, values);
            self.index_row(&row);
            delta.push_insert(row.clone());
            self.rows.insert(id, row);
        }
        Ok(delta)
    }

    /// Apply `(old_id, new_values)` updates atomically: validated first,
    /// applied second, re-indexing only what changed.
    pub fn update(
        &mut self,
        changes: Vec<(u64, Vec<Value>)>,
    ) -> Result<TableDelta, ValidationError> {
        let mut batch_pk_seen = std::collections::HashSet::new();
        let mut batch_unique_seen: std::collections::HashMap<
            String,
            std::collections::HashSet<Value>,
        > = std::collections::HashMap::new();

        for (id, values) in &changes {
            self.validate_row_values(values)?;
            let old = &self.rows[id];
            let new_pk = &values[self.schema.primary_key_index()];
            if new_pk != &old.values[self.schema.primary_key_index()] {
                self.check_unique_constraints(values, &batch_pk_seen, &batch_unique_seen)?;
            }
            batch_pk_seen.insert(new_pk.clone());
        }

        let mut delta = TableDelta::new(self.schema.name.clone());
        for (id, values) in changes {
            let old = self.rows.remove(&id).expect("checked above");
            self.unindex_row(&old);
            let new_row = Row::new(id, values);
            self.index_row(&new_row);
            delta.push_delete(old);
            delta.push_insert(new_row.clone());
            self.rows.insert(id, new_row);
        }
        Ok(delta)
    }

    /// Remove rows by id; ids not present are silently skipped (idempotent
    /// delete, spec.md §8).
    pub fn delete(&mut self, ids: &[u64]) -> TableDelta {
        let mut delta = TableDelta::new(self.schema.name.clone());
        for id in ids {
            if let Some(row) = self.rows.remove(id) {
                self.unindex_row(&row);
                delta.push_delete(row);
            }
        }
        delta
    }

    fn index_row(&mut self, row: &Row) {
        let pk_val = row.values[self.schema.primary_key_index()].clone();
        self.pk_index
            .try_insert(pk_val, row.id)
            .expect("uniqueness pre-checked");

        for idx in &self.schema.indexes {
            let col = self.schema.column_index(&idx.column).expect("validated");
            match idx.kind {
                IndexKind::Ordered => {
                    self.ordered_indexes
                        .get_mut(&idx.name)
                        .expect("constructed in new()")
                        .insert(row.values[col].clone(), row.id);
                }
                IndexKind::Unique => {
                    self.unique_indexes
                        .get_mut(&idx.name)
                        .expect("constructed in new()")
                        .try_insert(row.values[col].clone(), row.id)
                        .expect("uniqueness pre-checked");
                }
                IndexKind::Gin => {
                    self.gin_indexes
                        .get_mut(&idx.name)
                        .expect("constructed in new()")
                        .on_insert(row);
                }
            }
        }
    }

    fn unindex_row(&mut self, row: &Row) {
        let pk_val = &row.values[self.schema.primary_key_index()];
        self.pk_index.remove(pk_val, row.id);

        for idx in &self.schema.indexes {
            let col = self.schema.column_index(&idx.column).expect("validated");
            match idx.kind {
                IndexKind::Ordered => {
                    self.ordered_indexes
                        .get_mut(&idx.name)
                        .expect("constructed in new()")
                        .remove(&row.values[col], row.id);
                }
                IndexKind::Unique => {
                    self.unique_indexes
                        .get_mut(&idx.name)
                        .expect("constructed in new()")
                        .remove(&row.values[col], row.id);
                }
                IndexKind::Gin => {
                    self.gin_indexes
                        .get_mut(&idx.name)
                        .expect("constructed in new()")
                        .on_delete(row);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, IndexDef};
    use crate::value::DataType;

    fn items_table() -> Table {
        let schema = TableSchema::new(
            "items",
            vec![
                ColumnDef::new("id", DataType::Int64, false),
                ColumnDef::new("name", DataType::String, true),
            ],
            "id",
            vec![IndexDef::ordered("items_name_idx", "name")],
        )
        .unwrap();
        Table::new(schema)
    }

    #[test]
    fn insert_assigns_monotonic_ids_and_indexes() {
        let mut t = items_table();
        let delta = t
            .insert(vec![
                vec![Value::Int64(1), Value::string("a")],
                vec![Value::Int64(2), Value::string("b")],
            ])
            .unwrap();
        assert_eq!(delta.changes.len(), 2);
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.ordered_index("items_name_idx").unwrap().get(&Value::string("a")), vec![1]);
    }

    #[test]
    fn duplicate_pk_fails_whole_batch() {
        let mut t = items_table();
        t.insert(vec![vec![Value::Int64(1), Value::string("a")]])
            .unwrap();
        let err = t
            .insert(vec![
                vec![Value::Int64(2), Value::string("b")],
                vec![Value::Int64(1), Value::string("c")],
            ])
            .unwrap_err();
        assert!(matches!(err, ValidationError::UniqueViolation { .. }));
        // no partial mutation: row 2 was not committed either
        assert_eq!(t.row_count(), 1);
    }

    #[test]
    fn null_in_non_null_column_rejected() {
        let mut t = items_table();
        let err = t.insert(vec![vec![Value::Null, Value::string("a")]]).unwrap_err();
        assert!(matches!(err, ValidationError::NotNullViolation { .. }));
    }

    #[test]
    fn type_mismatch_rejected() {
        let mut t = items_table();
        let err = t
            .insert(vec![vec![Value::string("nope"), Value::string("a")]])
            .unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn update_reindexes_changed_column() {
        let mut t = items_table();
        t.insert(vec![vec![Value::Int64(1), Value::string("a")]])
            .unwrap();
        t.update(vec![(1, vec![Value::Int64(1), Value::string("z")])])
            .unwrap();
        assert!(t
            .ordered_index("items_name_idx")
            .unwrap()
            .get(&Value::string("a"))
            .is_empty());
        assert_eq!(
            t.ordered_index("items_name_idx").unwrap().get(&Value::string("z")),
            vec![1]
        );
    }

    #[test]
    fn delete_is_idempotent() {
        let mut t = items_table();
        t.insert(vec![vec![Value::Int64(1), Value::string("a")]])
            .unwrap();
        let d1 = t.delete(&[1]);
        assert_eq!(d1.changes.len(), 1);
        let d2 = t.delete(&[1]);
        assert!(d2.is_empty());
        assert_eq!(t.row_count(), 0);
    }

    #[test]
    fn nullable_indexed_column_contributes_no_posting_when_null() {
        let mut t = items_table();
        t.insert(vec![vec![Value::Int64(1), Value::Null]]).unwrap();
        assert!(t.ordered_index("items_name_idx").unwrap().is_empty());
    }
}
