//! Binary result buffer encoder (C9, spec.md §6.1).
//!
//! Little-endian, wire-stable: a 16-byte header, a fixed-stride row
//! block (null-mask + per-column fixed slots), and a trailing
//! variable-length region holding string/bytes/jsonb payloads.

use crate::schema::TableSchema;
use crate::value::{DataType, Value};
use std::collections::HashMap;

const HEADER_LEN: usize = 16;

fn type_tag(ty: DataType) -> u8 {
    match ty {
        DataType::Bool => 0,
        DataType::Int32 => 1,
        DataType::Int64 => 2,
        DataType::Float64 => 3,
        DataType::String => 4,
        DataType::DateTime => 5,
        DataType::Bytes => 6,
        DataType::Jsonb => 7,
    }
}

fn slot_width(ty: DataType) -> usize {
    match ty {
        DataType::Bool => 1,
        DataType::Int32 => 4,
        _ => 8,
    }
}

fn data_type_from_tag(tag: u8) -> DataType {
    match tag {
        0 => DataType::Bool,
        1 => DataType::Int32,
        2 => DataType::Int64,
        3 => DataType::Float64,
        4 => DataType::String,
        5 => DataType::DateTime,
        6 => DataType::Bytes,
        7 => DataType::Jsonb,
        other => unreachable!("unknown type tag {other}"),
    }
}

/// Per-column fixed-region placement, independent of any particular
/// result set — depends only on the output column types.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    pub name: String,
    pub type_tag: u8,
    pub fixed_offset: usize,
}

/// The schema layout descriptor accompanying a binary buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaLayout {
    pub column_count: usize,
    pub columns: Vec<ColumnLayout>,
    pub null_mask_size: usize,
    pub row_stride: usize,
}

impl SchemaLayout {
    pub fn new(columns: &[(String, DataType)]) -> Self {
        let column_count = columns.len();
        let null_mask_size = column_count.div_ceil(8);
        let mut offset = null_mask_size;
        let mut layouts = Vec::with_capacity(column_count);
        for (name, ty) in columns {
            layouts.push(ColumnLayout {
                name: name.clone(),
                type_tag: type_tag(*ty),
                fixed_offset: offset,
            });
            offset += slot_width(*ty);
        }
        SchemaLayout {
            column_count,
            columns: layouts,
            null_mask_size,
            row_stride: offset,
        }
    }

    pub fn for_projection(schema: &TableSchema, columns: &[usize]) -> Self {
        let cols: Vec<(String, DataType)> = columns
            .iter()
            .map(|&i| {
                let c = &schema.columns[i];
                (c.name.clone(), c.data_type)
            })
            .collect();
        SchemaLayout::new(&cols)
    }
}

/// Caches [`SchemaLayout`]s keyed by a projection signature (spec.md
/// §6.1: "implementations may cache this descriptor keyed by the
/// projection signature").
#[derive(Debug, Default)]
pub struct LayoutCache {
    cache: HashMap<Vec<(String, u8)>, SchemaLayout>,
}

impl LayoutCache {
    pub fn new() -> Self {
        LayoutCache::default()
    }

    pub fn get_or_build(&mut self, columns: &[(String, DataType)]) -> SchemaLayout {
        let signature: Vec<(String, u8)> = columns.iter().map(|(n, t)| (n.clone(), type_tag(*t))).collect();
        self.cache
            .entry(signature)
            .or_insert_with(|| SchemaLayout::new(columns))
            .clone()
    }
}

/// Encode `rows` (each already shaped to `layout`'s column order) into a
/// wire-stable binary result buffer.
pub fn encode(layout: &SchemaLayout, rows: &[Vec<Value>]) -> Vec<u8> {
    let row_count = rows.len();
    let fixed_region_len = row_count * layout.row_stride;
    let var_offset = HEADER_LEN + fixed_region_len;

    let mut fixed = vec![0u8; fixed_region_len];
    let mut var = Vec::new();

    for (r, row) in rows.iter().enumerate() {
        let row_start = r * layout.row_stride;
        for (c, col) in layout.columns.iter().enumerate() {
            let value = &row[c];
            if value.is_null() {
                let byte = row_start + (c / 8);
                fixed[byte] |= 1 << (c % 8);
                continue;
            }
            let slot = row_start + col.fixed_offset;
            write_slot(&mut fixed, slot, value, &mut var);
        }
    }

    let mut buf = Vec::with_capacity(var_offset + var.len());
    buf.extend_from_slice(&(row_count as u32).to_le_bytes());
    buf.extend_from_slice(&(layout.row_stride as u32).to_le_bytes());
    buf.extend_from_slice(&(var_offset as u32).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&fixed);
    buf.extend_from_slice(&var);
    buf
}

fn write_slot(fixed: &mut [u8], slot: usize, value: &Value, var: &mut Vec<u8>) {
    match value {
        Value::Bool(b) => fixed[slot] = u8::from(*b),
        Value::Int32(i) => fixed[slot..slot + 4].copy_from_slice(&i.to_le_bytes()),
        // Held as an f64 equivalent for exchange (spec.md §6.1); precision
        // beyond 2^53 is lost crossing the wire, a decision recorded in
        // the design notes rather than silently hidden.
        Value::Int64(i) => fixed[slot..slot + 8].copy_from_slice(&(*i as f64).to_le_bytes()),
        Value::Float64(f) => fixed[slot..slot + 8].copy_from_slice(&f.to_le_bytes()),
        Value::DateTime(d) => {
            let millis = d.timestamp_millis() as f64;
            fixed[slot..slot + 8].copy_from_slice(&millis.to_le_bytes());
        }
        Value::String(s) => write_var_slot(fixed, slot, s.as_bytes(), var),
        Value::Bytes(b) => write_var_slot(fixed, slot, b, var),
        Value::Jsonb(j) => write_var_slot(fixed, slot, j.to_string().as_bytes(), var),
        Value::Null => unreachable!("nulls are handled via the null mask before reaching a slot"),
    }
}

fn write_var_slot(fixed: &mut [u8], slot: usize, bytes: &[u8], var: &mut Vec<u8>) {
    let offset = var.len() as u32;
    let length = bytes.len() as u32;
    var.extend_from_slice(bytes);
    fixed[slot..slot + 4].copy_from_slice(&offset.to_le_bytes());
    fixed[slot + 4..slot + 8].copy_from_slice(&length.to_le_bytes());
}

/// Reconstruct the rows encoded into `buf` under `layout`, the inverse of
/// [`encode`]. `decode(layout, &encode(layout, rows)) == rows` for any
/// `rows` shaped to `layout`'s column order.
pub fn decode(layout: &SchemaLayout, buf: &[u8]) -> Vec<Vec<Value>> {
    let header = decode_header(buf);
    let row_count = header.row_count as usize;
    let fixed = &buf[HEADER_LEN..header.var_offset as usize];
    let var = &buf[header.var_offset as usize..];

    let mut rows = Vec::with_capacity(row_count);
    for r in 0..row_count {
        let row_start = r * layout.row_stride;
        let mut row = Vec::with_capacity(layout.column_count);
        for (c, col) in layout.columns.iter().enumerate() {
            let mask_byte = fixed[row_start + (c / 8)];
            if mask_byte & (1 << (c % 8)) != 0 {
                row.push(Value::Null);
                continue;
            }
            let slot = row_start + col.fixed_offset;
            row.push(read_slot(fixed, slot, data_type_from_tag(col.type_tag), var));
        }
        rows.push(row);
    }
    rows
}

fn read_slot(fixed: &[u8], slot: usize, ty: DataType, var: &[u8]) -> Value {
    match ty {
        DataType::Bool => Value::Bool(fixed[slot] != 0),
        DataType::Int32 => Value::Int32(i32::from_le_bytes(fixed[slot..slot + 4].try_into().unwrap())),
        DataType::Int64 => {
            let bits = f64::from_le_bytes(fixed[slot..slot + 8].try_into().unwrap());
            Value::Int64(bits as i64)
        }
        DataType::Float64 => Value::Float64(f64::from_le_bytes(fixed[slot..slot + 8].try_into().unwrap())),
        DataType::DateTime => {
            let millis = f64::from_le_bytes(fixed[slot..slot + 8].try_into().unwrap()) as i64;
            Value::DateTime(chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default())
        }
        DataType::String => {
            let bytes = read_var_slot(fixed, slot, var);
            Value::string(String::from_utf8_lossy(bytes).into_owned())
        }
        DataType::Bytes => Value::Bytes(read_var_slot(fixed, slot, var).to_vec()),
        DataType::Jsonb => {
            let bytes = read_var_slot(fixed, slot, var);
            Value::Jsonb(serde_json::from_slice(bytes).unwrap_or(serde_json::Value::Null))
        }
    }
}

fn read_var_slot<'a>(fixed: &[u8], slot: usize, var: &'a [u8]) -> &'a [u8] {
    let offset = u32::from_le_bytes(fixed[slot..slot + 4].try_into().unwrap()) as usize;
    let length = u32::from_le_bytes(fixed[slot + 4..slot + 8].try_into().unwrap()) as usize;
    &var[offset..offset + length]
}

/// Header fields decoded back out of an encoded buffer, used by tests and
/// by any host-side consumer written in Rust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHeader {
    pub row_count: u32,
    pub row_stride: u32,
    pub var_offset: u32,
    pub flags: u32,
}

pub fn decode_header(buf: &[u8]) -> BufferHeader {
    BufferHeader {
        row_count: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
        row_stride: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        var_offset: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        flags: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_round_trips() {
        let layout = SchemaLayout::new(&[("id".into(), DataType::Int64)]);
        let rows = vec![vec![Value::Int64(42)]];
        let buf = encode(&layout, &rows);
        let header = decode_header(&buf);
        assert_eq!(header.row_count, 1);
        assert_eq!(header.row_stride as usize, layout.row_stride);
        assert_eq!(header.flags, 0);
    }

    #[test]
    fn null_mask_bit_is_set_for_null_values() {
        let layout = SchemaLayout::new(&[("a".into(), DataType::Int64), ("b".into(), DataType::String)]);
        let rows = vec![vec![Value::Null, Value::string("x")]];
        let buf = encode(&layout, &rows);
        let header = decode_header(&buf);
        let row_start = HEADER_LEN;
        let mask_byte = buf[row_start];
        assert_eq!(mask_byte & 0b1, 1);
        assert_eq!(mask_byte & 0b10, 0);
        assert_eq!(header.var_offset as usize, HEADER_LEN + layout.row_stride);
    }

    #[test]
    fn string_slot_points_into_variable_region() {
        let layout = SchemaLayout::new(&[("name".into(), DataType::String)]);
        let rows = vec![vec![Value::string("hi")]];
        let buf = encode(&layout, &rows);
        let header = decode_header(&buf);
        let var = &buf[header.var_offset as usize..];
        assert_eq!(var, b"hi");
    }

    #[test]
    fn jsonb_slot_round_trips_through_variable_region() {
        let layout = SchemaLayout::new(&[("doc".into(), DataType::Jsonb)]);
        let rows = vec![vec![Value::Jsonb(json!({"a": 1}))]];
        let buf = encode(&layout, &rows);
        let header = decode_header(&buf);
        let var = &buf[header.var_offset as usize..];
        assert_eq!(var, br#"{"a":1}"#);
    }

    #[test]
    fn decode_of_encode_round_trips_every_type_tag() {
        let columns = vec![
            ("a".into(), DataType::Bool),
            ("b".into(), DataType::Int32),
            ("c".into(), DataType::Int64),
            ("d".into(), DataType::Float64),
            ("e".into(), DataType::String),
            ("f".into(), DataType::DateTime),
            ("g".into(), DataType::Bytes),
            ("h".into(), DataType::Jsonb),
        ];
        let layout = SchemaLayout::new(&columns);
        let rows = vec![
            vec![
                Value::Bool(true),
                Value::Int32(-7),
                Value::Int64(42),
                Value::Float64(3.5),
                Value::string("hi"),
                Value::DateTime(chrono::DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()),
                Value::Bytes(vec![1, 2, 3]),
                Value::Jsonb(json!({"a": 1})),
            ],
            vec![
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ],
        ];
        let buf = encode(&layout, &rows);
        assert_eq!(decode(&layout, &buf), rows);
    }

    #[test]
    fn int64_outside_safe_integer_range_preserves_float64_bit_pattern() {
        let layout = SchemaLayout::new(&[("n".into(), DataType::Int64)]);
        let huge = i64::MAX;
        let rows = vec![vec![Value::Int64(huge)]];
        let buf = encode(&layout, &rows);
        let decoded = decode(&layout, &buf);
        let expected = (huge as f64) as i64;
        assert_eq!(decoded, vec![vec![Value::Int64(expected)]]);
    }

    #[test]
    fn strings_of_length_zero_and_100000_bytes_round_trip() {
        let layout = SchemaLayout::new(&[("s".into(), DataType::String)]);
        let long = "x".repeat(100_000);
        let rows = vec![vec![Value::string("")], vec![Value::string(long.clone())]];
        let buf = encode(&layout, &rows);
        let decoded = decode(&layout, &buf);
        assert_eq!(decoded, rows);
        match &decoded[1][0] {
            Value::String(s) => assert_eq!(s.len(), 100_000),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn layout_cache_returns_same_layout_for_same_signature() {
        let mut cache = LayoutCache::new();
        let a = cache.get_or_build(&[("id".into(), DataType::Int64)]);
        let b = cache.get_or_build(&[("id".into(), DataType::Int64)]);
        assert_eq!(a, b);
    }
}
