//! Schema registry (C2): table/column/index definitions and name resolution.

use crate::error::SchemaError;
use crate::value::{DataType, JsonPath, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        ColumnDef {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// The kind of a secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Ordered (B-tree-like) index over one column.
    Ordered,
    /// Ordered index that also enforces uniqueness.
    Unique,
    /// Generalized inverted index over a `Jsonb` column.
    Gin,
}

/// A secondary index declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub column: String,
    pub kind: IndexKind,
    /// For GIN indexes, paths to maintain eagerly from schema declaration
    /// time rather than waiting for a query to demand them.
    #[serde(default)]
    pub eager_paths: Vec<JsonPath>,
}

impl IndexDef {
    pub fn ordered(name: impl Into<String>, column: impl Into<String>) -> Self {
        IndexDef {
            name: name.into(),
            column: column.into(),
            kind: IndexKind::Ordered,
            eager_paths: Vec::new(),
        }
    }

    pub fn unique(name: impl Into<String>, column: impl Into<String>) -> Self {
        IndexDef {
            name: name.into(),
            column: column.into(),
            kind: IndexKind::Unique,
            eager_paths: Vec::new(),
        }
    }

    pub fn gin(name: impl Into<String>, column: impl Into<String>) -> Self {
        IndexDef {
            name: name.into(),
            column: column.into(),
            kind: IndexKind::Gin,
            eager_paths: Vec::new(),
        }
    }

    pub fn with_eager_paths(mut self, paths: Vec<JsonPath>) -> Self {
        self.eager_paths = paths;
        self
    }
}

/// A full table schema: columns, primary key, and declared secondary
/// indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: String,
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    /// Build and validate a schema: exactly one primary-key column, no
    /// duplicate column/index names, every index references a real column.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        primary_key: impl Into<String>,
        indexes: Vec<IndexDef>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let primary_key = primary_key.into();

        if !columns.iter().any(|c| c.name == primary_key) {
            return Err(SchemaError::InvalidPrimaryKey(format!(
                "primary key column '{primary_key}' not declared on table '{name}'"
            )));
        }
        if columns
            .iter()
            .find(|c| c.name == primary_key)
            .map(|c| c.nullable)
            == Some(true)
        {
            return Err(SchemaError::InvalidPrimaryKey(format!(
                "primary key column '{primary_key}' must not be nullable"
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for c in &columns {
            if !seen.insert(&c.name) {
                return Err(SchemaError::SchemaConflict(format!(
                    "duplicate column '{}' on table '{name}'",
                    c.name
                )));
            }
        }
        for idx in &indexes {
            if !columns.iter().any(|c| c.name == idx.column) {
                return Err(SchemaError::UnknownColumn {
                    table: name.clone(),
                    column: idx.column.clone(),
                });
            }
        }

        Ok(TableSchema {
            name,
            columns,
            primary_key,
            indexes,
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key_index(&self) -> usize {
        self.column_index(&self.primary_key)
            .expect("validated at construction")
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Validate a row's arity and per-column types/nullability.
    pub fn validate_row(&self, values: &[Value]) -> Result<(), SchemaError> {
        if values.len() != self.columns.len() {
            return Err(SchemaError::SchemaConflict(format!(
                "row arity {} does not match table '{}' arity {}",
                values.len(),
                self.name,
                self.columns.len()
            )));
        }
        Ok(())
    }
}

/// The schema registry: a name -> [`TableSchema`] map, read-only after a
/// table is created (§5: "a table schema is read-only after creation").
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, TableSchema>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<(), SchemaError> {
        if self.tables.contains_key(&schema.name) {
            return Err(SchemaError::SchemaConflict(schema.name.clone()));
        }
        self.tables.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<TableSchema, SchemaError> {
        self.tables
            .remove(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<&TableSchema, SchemaError> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}
