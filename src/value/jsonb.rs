//! JSON-path addressing into `Jsonb` values (C1/C4).
//!
//! Paths are the `$.a.b…` subset described in spec.md: dotted field access
//! into nested JSON objects, terminating at a scalar leaf. A `GIN index`
//! maintains postings only for paths that have actually been demanded by a
//! schema declaration or a query (see [`crate::storage::gin::GinIndex`]).

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed `$.a.b.c` path: the segments after `$`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JsonPath(Vec<String>);

impl JsonPath {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        JsonPath(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Parse `"$.a.b"` into its segments. Returns `None` for malformed
    /// paths (must start with `$` and have at least one segment).
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix('$')?;
        if rest.is_empty() {
            return Some(JsonPath(Vec::new()));
        }
        let rest = rest.strip_prefix('.')?;
        if rest.is_empty() {
            return None;
        }
        Some(JsonPath(rest.split('.').map(str::to_string).collect()))
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, ".{seg}")?;
        }
        Ok(())
    }
}

/// Navigate `json` along `path` and return the scalar leaf found there, or
/// `None` if the path does not resolve to a present scalar (missing key,
/// or the path resolves to an object/array rather than a leaf).
pub fn json_leaf_at_path(json: &serde_json::Value, path: &JsonPath) -> Option<Value> {
    let mut cur = json;
    for seg in path.segments() {
        cur = cur.as_object()?.get(seg)?;
    }
    scalar_to_value(cur)
}

fn scalar_to_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Null => Some(Value::Null),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int64(i))
            } else {
                n.as_f64().map(Value::Float64)
            }
        }
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}
