//! Aggregate function semantics (C8 Aggregate/GroupBy).

use crate::executor::Tuple;
use crate::plan::AggKind;
use crate::value::Value;

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Int32(i) => Some(*i as f64),
        Value::Int64(i) => Some(*i as f64),
        Value::Float64(f) => Some(*f),
        _ => None,
    }
}

fn non_null_numeric_column(rows: &[Tuple], col: usize) -> Vec<f64> {
    rows.iter()
        .filter_map(|r| if r[col].is_null() { None } else { numeric(&r[col]) })
        .collect()
}

/// Compute a single aggregate over `rows` per spec.md §4.4:
/// - `Count` counts all rows; `CountCol` counts non-null values.
/// - `Sum/Avg/Min/Max/Stddev` ignore nulls; `Avg` over an empty/all-null
///   group is null. `Stddev` is the population form; a single value is 0.
/// - `Geomean` only considers strictly positive finite values; an empty
///   filtered set is null.
/// - `Distinct` counts distinct values, treating null as one value.
pub fn compute_aggregate(kind: &AggKind, rows: &[Tuple]) -> Value {
    match kind {
        AggKind::Count => Value::Int64(rows.len() as i64),
        AggKind::CountCol(c) => {
            Value::Int64(rows.iter().filter(|r| !r[*c].is_null()).count() as i64)
        }
        AggKind::Sum(c) => {
            let values = non_null_numeric_column(rows, *c);
            if values.is_empty() {
                Value::Null
            } else {
                Value::Float64(values.iter().sum())
            }
        }
        AggKind::Avg(c) => {
            let values = non_null_numeric_column(rows, *c);
            if values.is_empty() {
                Value::Null
            } else {
                Value::Float64(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggKind::Min(c) => rows
            .iter()
            .map(|r| &r[*c])
            .filter(|v| !v.is_null())
            .min()
            .cloned()
            .unwrap_or(Value::Null),
        AggKind::Max(c) => rows
            .iter()
            .map(|r| &r[*c])
            .filter(|v| !v.is_null())
            .max()
            .cloned()
            .unwrap_or(Value::Null),
        AggKind::Stddev(c) => {
            let values = non_null_numeric_column(rows, *c);
            if values.is_empty() {
                Value::Null
            } else if values.len() == 1 {
                Value::Float64(0.0)
            } else {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let variance =
                    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
                Value::Float64(variance.sqrt())
            }
        }
        AggKind::Geomean(c) => {
            let values: Vec<f64> = non_null_numeric_column(rows, *c)
                .into_iter()
                .filter(|v| v.is_finite() && *v > 0.0)
                .collect();
            if values.is_empty() {
                Value::Null
            } else {
                let mean_ln = values.iter().map(|v| v.ln()).sum::<f64>() / values.len() as f64;
                Value::Float64(mean_ln.exp())
            }
        }
        AggKind::Distinct(c) => {
            let mut seen: Vec<&Value> = Vec::new();
            for r in rows {
                if !seen.contains(&&r[*c]) {
                    seen.push(&r[*c]);
                }
            }
            Value::Int64(seen.len() as i64)
        }
    }
}

/// Build a `GroupBy` group key from the key-column indices.
pub fn compute_group_key(keys: &[usize], row: &Tuple) -> Vec<Value> {
    keys.iter().map(|&i| row[i].clone()).collect()
}
