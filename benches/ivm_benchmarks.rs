//! Compares per-write notification cost between the naive re-execution
//! observer and the IVM engine on a join view (spec.md §8 scenario 2:
//! IVM should cost roughly `O(|Δ|)` per write, not `O(table size)`).

use criterion::{criterion_group, criterion_main, Criterion};
use reactive_engine::engine::Engine;
use reactive_engine::plan::{JoinKind, JoinOn, PlanBuilder};
use reactive_engine::schema::{ColumnDef, TableSchema};
use reactive_engine::value::{DataType, Value};

const ROWS: i64 = 5_000;

fn setup() -> Engine {
    let mut engine = Engine::new();
    engine.create_database("bench").unwrap();
    let customers = TableSchema::new(
        "customers",
        vec![ColumnDef::new("id", DataType::Int64, false)],
        "id",
        vec![],
    )
    .unwrap();
    let orders = TableSchema::new(
        "orders",
        vec![
            ColumnDef::new("id", DataType::Int64, false),
            ColumnDef::new("customer_id", DataType::Int64, false),
        ],
        "id",
        vec![],
    )
    .unwrap();
    engine.create_table("bench", customers).unwrap();
    engine.create_table("bench", orders).unwrap();

    let customer_rows: Vec<Vec<Value>> = (0..ROWS).map(|i| vec![Value::Int64(i)]).collect();
    engine.insert("bench", "customers", customer_rows).unwrap();
    let order_rows: Vec<Vec<Value>> = (0..ROWS).map(|i| vec![Value::Int64(i), Value::Int64(i)]).collect();
    engine.insert("bench", "orders", order_rows).unwrap();
    engine
}

fn join_plan() -> std::sync::Arc<reactive_engine::Plan> {
    PlanBuilder::scan("customers")
        .join(
            JoinKind::Inner,
            JoinOn {
                left_col: 0,
                right_col: 1,
            },
            PlanBuilder::scan("orders"),
        )
        .build()
}

fn bench_observer_notify(c: &mut Criterion) {
    let mut engine = setup();
    let handle = engine.observe("bench", join_plan()).unwrap();
    let mut next_id = ROWS;
    c.bench_function("observer_notify_on_single_row_insert", |b| {
        b.iter(|| {
            engine
                .insert("bench", "customers", vec![vec![Value::Int64(next_id)]])
                .unwrap();
            next_id += 1;
        });
    });
    let _ = engine.handle_current_result(handle);
}

fn bench_ivm_notify(c: &mut Criterion) {
    let mut engine = setup();
    let handle = engine.trace("bench", join_plan()).unwrap();
    let mut next_id = ROWS;
    c.bench_function("ivm_notify_on_single_row_insert", |b| {
        b.iter(|| {
            engine
                .insert("bench", "customers", vec![vec![Value::Int64(next_id)]])
                .unwrap();
            next_id += 1;
        });
    });
    let _ = engine.handle_current_result(handle);
}

criterion_group!(benches, bench_observer_notify, bench_ivm_notify);
criterion_main!(benches);
