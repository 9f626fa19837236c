//! spec.md §8 scenario 5: aggregate semantics over a nullable column —
//! `Sum`/`Avg`/`Min`/`Max`/`Stddev`/`Geomean` ignore nulls and go null over
//! an all-null group, `Count` counts every row, `CountCol` only non-null
//! ones.

use reactive_engine::plan::{AggKind, AggSpec};
use reactive_engine::schema::{ColumnDef, TableSchema};
use reactive_engine::value::{DataType, Value};
use reactive_engine::{Engine, PlanBuilder};

fn setup(rows: Vec<Vec<Value>>) -> Engine {
    let mut engine = Engine::new();
    engine.create_database("default").unwrap();
    let schema = TableSchema::new(
        "items",
        vec![
            ColumnDef::new("id", DataType::Int64, false),
            ColumnDef::new("value", DataType::Int32, true),
        ],
        "id",
        vec![],
    )
    .unwrap();
    engine.create_table("default", schema).unwrap();
    engine.insert("default", "items", rows).unwrap();
    engine
}

#[test]
fn mixed_nulls_aggregate_correctly() {
    let mut engine = setup(vec![
        vec![Value::Int64(1), Value::Int32(10)],
        vec![Value::Int64(2), Value::Null],
        vec![Value::Int64(3), Value::Int32(30)],
    ]);

    let plan = PlanBuilder::scan("items")
        .aggregate(vec![
            AggSpec::new(AggKind::Sum(1), "sum"),
            AggSpec::new(AggKind::Avg(1), "avg"),
            AggSpec::new(AggKind::Count, "count"),
            AggSpec::new(AggKind::CountCol(1), "count_col"),
            AggSpec::new(AggKind::Stddev(1), "stddev"),
        ])
        .build();
    let rows = engine.select("default", &plan).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row[0], Value::Float64(40.0));
    assert_eq!(row[1], Value::Float64(20.0));
    assert_eq!(row[2], Value::Int64(3));
    assert_eq!(row[3], Value::Int64(2));
    // population stddev of [10, 30]: mean 20, variance 100, sqrt = 10
    match &row[4] {
        Value::Float64(f) => assert!((f - 10.0).abs() < 1e-9),
        other => panic!("expected float stddev, got {other:?}"),
    }
}

#[test]
fn all_null_group_yields_null_aggregates_but_real_counts() {
    let mut engine = setup(vec![
        vec![Value::Int64(1), Value::Null],
        vec![Value::Int64(2), Value::Null],
    ]);

    let plan = PlanBuilder::scan("items")
        .aggregate(vec![
            AggSpec::new(AggKind::Avg(1), "avg"),
            AggSpec::new(AggKind::Sum(1), "sum"),
            AggSpec::new(AggKind::Min(1), "min"),
            AggSpec::new(AggKind::Max(1), "max"),
            AggSpec::new(AggKind::Stddev(1), "stddev"),
            AggSpec::new(AggKind::Geomean(1), "geomean"),
            AggSpec::new(AggKind::Count, "count"),
            AggSpec::new(AggKind::CountCol(1), "count_col"),
        ])
        .build();
    let rows = engine.select("default", &plan).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row[0], Value::Null);
    assert_eq!(row[1], Value::Null);
    assert_eq!(row[2], Value::Null);
    assert_eq!(row[3], Value::Null);
    assert_eq!(row[4], Value::Null);
    assert_eq!(row[5], Value::Null);
    assert_eq!(row[6], Value::Int64(2));
    assert_eq!(row[7], Value::Int64(0));
}
