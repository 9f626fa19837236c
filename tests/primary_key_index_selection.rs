//! spec.md §8 scenario 1: a primary-key equality filter optimizes to an
//! `IndexGet` and returns exactly the matching row.

use reactive_engine::expr::Expr;
use reactive_engine::schema::{ColumnDef, TableSchema};
use reactive_engine::value::{DataType, Value};
use reactive_engine::{Engine, PlanBuilder};

#[test]
fn primary_key_equality_selects_index_get() {
    let mut engine = Engine::new();
    engine.create_database("default").unwrap();
    let schema = TableSchema::new(
        "items",
        vec![
            ColumnDef::new("id", DataType::Int64, false),
            ColumnDef::new("name", DataType::String, false),
        ],
        "id",
        vec![],
    )
    .unwrap();
    engine.create_table("default", schema).unwrap();
    engine
        .insert(
            "default",
            "items",
            vec![
                vec![Value::Int64(1), Value::string("a")],
                vec![Value::Int64(2), Value::string("b")],
                vec![Value::Int64(3), Value::string("c")],
            ],
        )
        .unwrap();

    let plan = PlanBuilder::scan("items").filter(Expr::col(0).eq(Expr::lit(2))).build();
    let explain = engine.explain("default", &plan).unwrap();
    assert!(explain.optimized.contains("IndexGet"));

    let rows = engine.select("default", &plan).unwrap();
    assert_eq!(rows, vec![vec![Value::Int64(2), Value::string("b")]]);
}
