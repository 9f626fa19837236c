//! Table delta change-log (feeds C10 and C11).
//!
//! Every committed write batch produces one [`TableDelta`] per affected
//! table: a signed multiset of rows, `+1` for each inserted row and `-1`
//! for each removed one. An update is represented as `-1(old), +1(new)`,
//! exactly as spec.md §4.6 describes for IVM source deltas; the
//! re-execution observer (C10) only looks at which tables were touched,
//! so it only needs the table name, not the row contents.

use crate::value::Row;

/// A signed multiset of row changes for one table, produced by one write
/// batch.
#[derive(Debug, Clone, Default)]
pub struct TableDelta {
    pub table: String,
    /// `(row, multiplicity)` pairs; multiplicity is `+1` or `-1`. Multiple
    /// entries for the same row never collapse here — collapsing is an
    /// IVM operator's job (arrangements de-duplicate on ingest).
    pub changes: Vec<(Row, i64)>,
}

impl TableDelta {
    pub fn new(table: impl Into<String>) -> Self {
        TableDelta {
            table: table.into(),
            changes: Vec::new(),
        }
    }

    pub fn push_insert(&mut self, row: Row) {
        self.changes.push((row, 1));
    }

    pub fn push_delete(&mut self, row: Row) {
        self.changes.push((row, -1));
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// One committed write batch's deltas, one entry per affected table.
pub type BatchDeltas = Vec<TableDelta>;
