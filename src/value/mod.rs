//! Scalar type system (C1).
//!
//! `DataType` is the declared tag for a column; `Value` is a runtime scalar
//! tagged the same way plus a `Null` marker. Equality is value equality;
//! ordering is natural per type. `Null` never compares equal or ordered to
//! anything in 3VL terms — callers asking "is this row's value null" want
//! [`crate::expr::Expr::IsNull`], not the `Eq` expression operator.
//!
//! ## Example
//!
//! ```
//! use reactive_engine::value::{Value, DataType};
//!
//! let v = Value::Int64(42);
//! assert_eq!(v.data_type(), Some(DataType::Int64));
//! assert!(!v.is_null());
//! ```

mod jsonb;
mod trilean;

pub use jsonb::{json_leaf_at_path, JsonPath};
pub use trilean::Trilean;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Declared column type tag (does not include `Null` — nullability is a
/// separate per-column flag, see [`crate::schema::ColumnDef`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    Float64,
    String,
    DateTime,
    Bytes,
    Jsonb,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Bool => "Bool",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float64 => "Float64",
            DataType::String => "String",
            DataType::DateTime => "DateTime",
            DataType::Bytes => "Bytes",
            DataType::Jsonb => "Jsonb",
        };
        f.write_str(s)
    }
}

/// A runtime scalar value, one per [`DataType`] tag plus `Null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Bytes(Vec<u8>),
    Jsonb(serde_json::Value),
    Null,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The tag this value carries, or `None` for `Null` (which is
    /// compatible with any nullable column).
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::String(_) => Some(DataType::String),
            Value::DateTime(_) => Some(DataType::DateTime),
            Value::Bytes(_) => Some(DataType::Bytes),
            Value::Jsonb(_) => Some(DataType::Jsonb),
            Value::Null => None,
        }
    }

    /// Whether this value's tag matches `ty`, or it is `Null`.
    pub fn matches_type(&self, ty: DataType) -> bool {
        match self.data_type() {
            Some(t) => t == ty,
            None => true,
        }
    }

    /// Three-valued equality: `Unknown` if either side is `Null`.
    pub fn eq3(&self, other: &Value) -> Trilean {
        if self.is_null() || other.is_null() {
            return Trilean::Unknown;
        }
        Trilean::from(self.partial_cmp_total(other) == Ordering::Equal)
    }

    /// Three-valued ordering comparison used by comparison expressions.
    pub fn cmp3(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.partial_cmp_total(other))
    }

    /// Total ordering used for sort keys, index keys, and structural
    /// equality (`Null` sorts as its own bucket here; the `Sort` operator
    /// applies the SQL-style "nulls last ascending / first descending"
    /// placement explicitly rather than relying on this order).
    fn partial_cmp_total(&self, other: &Value) -> Ordering {
        use Value::{Bool, Bytes, DateTime, Float64, Int32, Int64, Jsonb, Null, String};
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int32(a), Int32(b)) => a.cmp(b),
            (Int64(a), Int64(b)) => a.cmp(b),
            (Float64(a), Float64(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
            (String(a), String(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Jsonb(a), Jsonb(b)) => a.to_string().cmp(&b.to_string()),
            // Mixed-type comparisons never occur for well-typed columns;
            // fall back to a stable (if arbitrary) tag order.
            _ => tag_index(self).cmp(&tag_index(other)),
        }
    }

    /// A deterministic fingerprint used as an index/GIN posting key and as
    /// the value component of an IVM row fingerprint.
    fn fingerprint<H: Hasher>(&self, state: &mut H) {
        tag_index(self).hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int32(i) => i.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => OrderedFloat(*f).hash(state),
            Value::String(s) => s.hash(state),
            Value::DateTime(d) => d.timestamp_nanos_opt().unwrap_or(i64::MIN).hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Jsonb(j) => j.to_string().hash(state),
            Value::Null => {}
        }
    }
}

fn tag_index(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Int32(_) => 1,
        Value::Int64(_) => 2,
        Value::Float64(_) => 3,
        Value::String(_) => 4,
        Value::DateTime(_) => 5,
        Value::Bytes(_) => 6,
        Value::Jsonb(_) => 7,
        Value::Null => 8,
    }
}

impl PartialEq for Value {
    /// Structural equality, including `Null == Null`. Used for fingerprints
    /// and row-set membership; distinct from the 3VL [`Value::eq3`] used by
    /// the `Eq` expression operator, where `Null` never matches anything.
    fn eq(&self, other: &Value) -> bool {
        self.partial_cmp_total(other) == Ordering::Equal
    }
}
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint(state);
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.partial_cmp_total(other))
    }
}
impl Ord for Value {
    fn cmp(&self, other: &Value) -> Ordering {
        self.partial_cmp_total(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::DateTime(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Bytes(b) => write!(f, "0x{}", hex_encode(b)),
            Value::Jsonb(j) => write!(f, "{j}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A row is an ordered tuple of scalars keyed by column position, plus the
/// stable row-id assigned at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: u64,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(id: u64, values: Vec<Value>) -> Self {
        Row { id, values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// A deterministic fingerprint of the row's values (not its id), used
    /// by IVM sink arrangements, which key on row content.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for v in &self.values {
            v.fingerprint(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_never_eq3_true() {
        assert_eq!(Value::Null.eq3(&Value::Null), Trilean::Unknown);
        assert_eq!(Value::Int32(1).eq3(&Value::Null), Trilean::Unknown);
    }

    #[test]
    fn structural_eq_treats_null_as_equal_to_null() {
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Int32(1), Value::Null);
    }

    #[test]
    fn ordering_is_natural_per_type() {
        assert!(Value::Int64(1) < Value::Int64(2));
        assert!(Value::Float64(1.5) < Value::Float64(2.5));
        assert!(Value::String("a".into()) < Value::String("b".into()));
    }

    #[test]
    fn cmp3_is_none_across_null() {
        assert_eq!(Value::Int32(1).cmp3(&Value::Null), None);
    }

    #[test]
    fn data_type_round_trips() {
        assert_eq!(Value::Int32(1).data_type(), Some(DataType::Int32));
        assert_eq!(Value::Null.data_type(), None);
        assert!(Value::Null.matches_type(DataType::Int32));
    }

    #[test]
    fn fingerprint_is_stable_for_equal_rows() {
        let r1 = Row::new(1, vec![Value::Int32(1), Value::string("a")]);
        let r2 = Row::new(2, vec![Value::Int32(1), Value::string("a")]);
        assert_eq!(r1.fingerprint(), r2.fingerprint());
    }
}
