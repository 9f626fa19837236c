//! spec.md §8 scenario 3: two ANDed JSON-path equality predicates over a
//! GIN-indexed column optimize to a posting-list intersection and match a
//! brute-force scan.

use reactive_engine::expr::Expr;
use reactive_engine::schema::{ColumnDef, IndexDef, TableSchema};
use reactive_engine::value::{DataType, JsonPath, Value};
use reactive_engine::{Engine, PlanBuilder};
use serde_json::json;

const ROWS: i64 = 2_000;

#[test]
fn gin_multi_predicate_matches_brute_force_scan() {
    let mut engine = Engine::new();
    engine.create_database("default").unwrap();
    let schema = TableSchema::new(
        "documents",
        vec![
            ColumnDef::new("id", DataType::Int64, false),
            ColumnDef::new("metadata", DataType::Jsonb, false),
        ],
        "id",
        vec![IndexDef::gin("documents_metadata_gin", "metadata")],
    )
    .unwrap();
    engine.create_table("default", schema).unwrap();

    let rows: Vec<Vec<Value>> = (0..ROWS)
        .map(|i| {
            let category = if i % 3 == 0 { "tech" } else { "news" };
            let status = if i % 2 == 0 { "published" } else { "draft" };
            vec![
                Value::Int64(i),
                Value::Jsonb(json!({"category": category, "status": status})),
            ]
        })
        .collect();
    engine.insert("default", "documents", rows.clone()).unwrap();

    let category_path = JsonPath::parse("$.category").unwrap();
    let status_path = JsonPath::parse("$.status").unwrap();
    let plan = PlanBuilder::scan("documents")
        .filter(
            Expr::col(1)
                .json_path(category_path)
                .eq(Expr::lit(Value::string("tech")))
                .and(Expr::col(1).json_path(status_path).eq(Expr::lit(Value::string("published")))),
        )
        .build();

    let explain = engine.explain("default", &plan).unwrap();
    assert!(explain.physical.contains("GinIndexScanMulti"));

    let mut result = engine.select("default", &plan).unwrap();
    result.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap());

    let mut expected: Vec<Vec<Value>> = rows
        .into_iter()
        .filter(|r| {
            let Value::Jsonb(doc) = &r[1] else { return false };
            doc.get("category").and_then(|v| v.as_str()) == Some("tech")
                && doc.get("status").and_then(|v| v.as_str()) == Some("published")
        })
        .collect();
    expected.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap());

    assert!(!expected.is_empty());
    assert_eq!(result, expected);
}
