//! JSON wire types exchanged with the reference HTTP/WebSocket server.
//!
//! These mirror `engine::Engine`'s call surface one-to-one; the server
//! binary deserializes a `Request`, calls the matching `Engine` method,
//! and serializes the `Response`. Row values cross the wire as plain JSON
//! rather than the binary result buffer (`codec.rs`) — the binary buffer
//! is reserved for the embedded/in-process call path where the host is
//! also Rust and can decode it directly.

use crate::value::{DataType, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    CreateDatabase { database: String },
    DropDatabase { database: String },
    TableNames { database: String },
    Insert { database: String, table: String, rows: Vec<Vec<WireValue>> },
    Select { database: String, plan: Json },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Ok,
    TableNames { tables: Vec<String> },
    Rows { rows: Vec<Vec<WireValue>> },
    Error { message: String },
}

/// A JSON-safe projection of [`Value`]. `Int64` is carried as a JSON
/// number, same as the binary codec's float slot (spec.md §6.1) — values
/// beyond 2^53 lose precision crossing this wire too, consistently with
/// the binary path rather than silently gaining precision here. `Bytes`
/// is carried as an array of byte values rather than a base64 string,
/// avoiding a dependency purely for this one conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Null(Option<()>),
    Bool(bool),
    Number(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(Json),
}

impl From<&Value> for WireValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => WireValue::Null(None),
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Int32(i) => WireValue::Number(*i as f64),
            Value::Int64(i) => WireValue::Number(*i as f64),
            Value::Float64(f) => WireValue::Number(*f),
            Value::String(s) => WireValue::Text(s.clone()),
            Value::DateTime(d) => WireValue::Text(d.to_rfc3339()),
            Value::Bytes(b) => WireValue::Bytes(b.clone()),
            Value::Jsonb(j) => WireValue::Json(j.clone()),
        }
    }
}

/// Wire-level column descriptor, paired with a [`crate::codec::SchemaLayout`]
/// when a client requests the binary buffer path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireColumn {
    pub name: String,
    pub data_type: WireDataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireDataType {
    Bool,
    Int32,
    Int64,
    Float64,
    String,
    DateTime,
    Bytes,
    Jsonb,
}

impl From<DataType> for WireDataType {
    fn from(t: DataType) -> Self {
        match t {
            DataType::Bool => WireDataType::Bool,
            DataType::Int32 => WireDataType::Int32,
            DataType::Int64 => WireDataType::Int64,
            DataType::Float64 => WireDataType::Float64,
            DataType::String => WireDataType::String,
            DataType::DateTime => WireDataType::DateTime,
            DataType::Bytes => WireDataType::Bytes,
            DataType::Jsonb => WireDataType::Jsonb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_value_preserves_text() {
        let v = Value::string("hello");
        let wire = WireValue::from(&v);
        assert!(matches!(wire, WireValue::Text(s) if s == "hello"));
    }

    #[test]
    fn request_round_trips_through_json() {
        let req = Request::TableNames {
            database: "default".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        match back {
            Request::TableNames { database } => assert_eq!(database, "default"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}

