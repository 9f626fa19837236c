//! spec.md §8 scenario 6: three-valued filter evaluation — a `Null` value
//! never satisfies `>`, `<`, `IN`, or `BETWEEN`, end to end through the
//! engine facade (not just the bare expression evaluator).

use reactive_engine::expr::Expr;
use reactive_engine::schema::{ColumnDef, TableSchema};
use reactive_engine::value::{DataType, Value};
use reactive_engine::{Engine, PlanBuilder};

fn setup() -> Engine {
    let mut engine = Engine::new();
    engine.create_database("default").unwrap();
    let schema = TableSchema::new(
        "items",
        vec![
            ColumnDef::new("id", DataType::Int64, false),
            ColumnDef::new("v", DataType::Int32, true),
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
                vec![Value::Int64(1), Value::Int32(10)],
                vec![Value::Int64(2), Value::Null],
                vec![Value::Int64(3), Value::Int32(20)],
            ],
        )
        .unwrap();
    engine
}

#[test]
fn greater_than_never_matches_null() {
    let mut engine = setup();
    let plan = PlanBuilder::scan("items").filter(Expr::col(1).gt(Expr::lit(5i32))).build();
    assert_eq!(engine.select("default", &plan).unwrap().len(), 2);
}

#[test]
fn less_than_never_matches_null() {
    let mut engine = setup();
    let plan = PlanBuilder::scan("items").filter(Expr::col(1).lt(Expr::lit(100i32))).build();
    assert_eq!(engine.select("default", &plan).unwrap().len(), 2);
}

#[test]
fn in_list_never_matches_null() {
    let mut engine = setup();
    let plan = PlanBuilder::scan("items")
        .filter(Expr::col(1).in_list(vec![Expr::lit(10i32), Expr::lit(20i32)]))
        .build();
    assert_eq!(engine.select("default", &plan).unwrap().len(), 2);
}

#[test]
fn between_never_matches_null() {
    let mut engine = setup();
    let plan = PlanBuilder::scan("items")
        .filter(Expr::col(1).between(Expr::lit(1i32), Expr::lit(20i32)))
        .build();
    assert_eq!(engine.select("default", &plan).unwrap().len(), 2);
}
