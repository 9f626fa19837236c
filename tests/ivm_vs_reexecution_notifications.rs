//! spec.md §8 scenario 2: under a stream of random updates, a tracked
//! (IVM) view and a naive re-execution observer both stay consistent with
//! the base table, but the IVM view's delta identity holds exactly while
//! the observer only promises "re-run, eventually."

use reactive_engine::expr::Expr;
use reactive_engine::schema::{ColumnDef, TableSchema};
use reactive_engine::value::{DataType, Value};
use reactive_engine::{Assignment, Engine, PlanBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ROWS: i64 = 500;
const UPDATES: i64 = 500;

fn setup() -> Engine {
    let mut engine = Engine::new();
    engine.create_database("default").unwrap();
    let schema = TableSchema::new(
        "stocks",
        vec![
            ColumnDef::new("id", DataType::Int64, false),
            ColumnDef::new("price", DataType::Float64, false),
        ],
        "id",
        vec![],
    )
    .unwrap();
    engine.create_table("default", schema).unwrap();
    let rows: Vec<Vec<Value>> = (0..ROWS).map(|i| vec![Value::Int64(i), Value::Float64(100.0)]).collect();
    engine.insert("default", "stocks", rows).unwrap();
    engine
}

#[test]
fn ivm_and_observer_notification_counts_stay_in_bounds_and_ivm_reconstructs_exactly() {
    let mut engine = setup();
    let plan = PlanBuilder::scan("stocks").filter(Expr::col(1).gt(Expr::lit(500.0))).build();

    let initial_result = engine.select("default", &plan).unwrap();

    let observer_id = engine.observe("default", plan.clone()).unwrap();
    let observer_notifications = Arc::new(AtomicUsize::new(0));
    let oc = observer_notifications.clone();
    engine
        .handle_subscribe_observer(
            observer_id,
            Box::new(move |_rows| {
                oc.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    let ivm_id = engine.trace("default", plan.clone()).unwrap();
    let ivm_notifications = Arc::new(AtomicUsize::new(0));
    let added = Arc::new(std::sync::Mutex::new(Vec::new()));
    let removed = Arc::new(std::sync::Mutex::new(Vec::new()));
    let ic = ivm_notifications.clone();
    let added_clone = added.clone();
    let removed_clone = removed.clone();
    engine
        .handle_subscribe_ivm(
            ivm_id,
            Box::new(move |delta| {
                ic.fetch_add(1, Ordering::SeqCst);
                added_clone.lock().unwrap().extend(delta.added.iter().cloned());
                removed_clone.lock().unwrap().extend(delta.removed.iter().cloned());
            }),
        )
        .unwrap();

    for step in 0..UPDATES {
        let id = step % ROWS;
        let new_price = 100.0 + ((step * 37) % 900) as f64;
        engine
            .update(
                "default",
                "stocks",
                &[Assignment {
                    column: 1,
                    value: Expr::lit(new_price),
                }],
                &Expr::col(0).eq(Expr::lit(id)),
            )
            .unwrap();
    }

    let observer_count = observer_notifications.load(Ordering::SeqCst);
    let ivm_count = ivm_notifications.load(Ordering::SeqCst);
    assert!(observer_count >= 1 && observer_count <= UPDATES as usize);
    assert!(ivm_count >= 1 && ivm_count <= UPDATES as usize);

    let mut reconstructed = initial_result;
    for row in added.lock().unwrap().iter() {
        reconstructed.push(row.clone());
    }
    for row in removed.lock().unwrap().iter() {
        if let Some(pos) = reconstructed.iter().position(|r| r == row) {
            reconstructed.remove(pos);
        }
    }
    let mut reconstructed_sorted = reconstructed.clone();
    reconstructed_sorted.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap());

    let mut final_result = engine.select("default", &plan).unwrap();
    final_result.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap());

    assert_eq!(reconstructed_sorted, final_result);
}
