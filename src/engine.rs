//! Top-level engine facade (spec.md §6.2 host call surface).
//!
//! One `Engine` owns zero or more named [`Database`]s and the registry of
//! live observer/IVM handles. Handles are addressed by a dense id rather
//! than handed out as owned objects, per spec.md §9's guidance for the
//! observer/change-log and IVM-graph cyclic references: the engine is the
//! sole owner, callers hold an id.
//!
//! A database is selected explicitly on every call rather than implied by
//! engine-wide "current database" state — spec.md's host call surface does
//! not specify multi-database selection, and an explicit parameter avoids
//! a hidden mutable cursor in an otherwise synchronous, single-threaded
//! facade (recorded as an Open Question resolution in DESIGN.md).

use crate::changelog::TableDelta;
use crate::codec::{self, SchemaLayout};
use crate::error::{EngineError, RuntimeError, SchemaError, ValidationError};
use crate::executor::{self, ExecContext, Tuple};
use crate::expr::Expr;
use crate::ivm::{IvmDelta, IvmHandle};
use crate::observer::ObserverHandle;
use crate::optimizer::Optimizer;
use crate::plan::Plan;
use crate::schema::{Catalog, TableSchema};
use crate::storage::Table;
use crate::value::{DataType, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// One column assignment in an `update`: the target column and the
/// expression computing its new value, evaluated against the row's old
/// values (so `price = price * 1.1` is expressible, not just literals).
#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: usize,
    pub value: Expr,
}

struct Database {
    catalog: Catalog,
    tables: HashMap<String, Table>,
}

impl Database {
    fn new() -> Self {
        Database {
            catalog: Catalog::new(),
            tables: HashMap::new(),
        }
    }

    fn ctx(&self) -> ExecContext<'_> {
        ExecContext {
            catalog: &self.catalog,
            tables: &self.tables,
        }
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, EngineError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()).into())
    }
}

/// `{logical, optimized, physical}` stringified trees (spec.md §6.2). This
/// engine folds physical access-path nodes into the same `Plan` enum the
/// optimizer rewrites in place (see plan.rs), so `optimized` and
/// `physical` are always textually identical; both fields are kept so
/// host call sites matching spec.md's three-field shape don't need a
/// special case.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainOutput {
    pub logical: String,
    pub optimized: String,
    pub physical: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkResult {
    pub query_ms: f64,
    pub serialize_ms: f64,
    pub serialization_overhead_pct: f64,
}

enum HandleSlot {
    Observer { database: String, handle: ObserverHandle },
    Ivm { database: String, handle: IvmHandle },
}

/// The embeddable engine. Single-threaded cooperative core: every method
/// runs to completion synchronously, per spec.md §5. A host placing this
/// behind a thread boundary (see the `engine-server` binary) must itself
/// serialize inbound calls; `Engine` holds no internal lock.
pub struct Engine {
    databases: HashMap<String, Database>,
    handles: HashMap<u64, HandleSlot>,
    next_handle_id: AtomicU64,
    /// Set for the duration of delta propagation to subscriber callbacks;
    /// a write attempted while set is rejected with `ReentrantWrite`
    /// rather than silently queued, so the host sees the failure and can
    /// resubmit once the triggering call returns (spec.md §5).
    in_notification: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            databases: HashMap::new(),
            handles: HashMap::new(),
            next_handle_id: AtomicU64::new(1),
            in_notification: false,
        }
    }

    pub fn create_database(&mut self, name: &str) -> Result<(), EngineError> {
        if self.databases.contains_key(name) {
            return Err(SchemaError::SchemaConflict(name.to_string()).into());
        }
        self.databases.insert(name.to_string(), Database::new());
        Ok(())
    }

    pub fn drop_database(&mut self, name: &str) -> Result<(), EngineError> {
        self.handles.retain(|_, slot| match slot {
            HandleSlot::Observer { database, .. } | HandleSlot::Ivm { database, .. } => database != name,
        });
        self.databases
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()).into())
    }

    pub fn table_names(&self, database: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.db(database)?.catalog.table_names())
    }

    pub fn total_row_count(&self, database: &str) -> Result<usize, EngineError> {
        Ok(self.db(database)?.tables.values().map(Table::row_count).sum())
    }

    pub fn create_table(&mut self, database: &str, schema: TableSchema) -> Result<(), EngineError> {
        let db = self.db_mut(database)?;
        db.catalog.create_table(schema.clone())?;
        db.tables.insert(schema.name.clone(), Table::new(schema));
        Ok(())
    }

    pub fn drop_table(&mut self, database: &str, name: &str) -> Result<(), EngineError> {
        let db = self.db_mut(database)?;
        db.catalog.drop_table(name)?;
        db.tables.remove(name);
        Ok(())
    }

    pub fn insert(&mut self, database: &str, table: &str, rows: Vec<Vec<Value>>) -> Result<(), EngineError> {
        self.reject_if_notifying()?;
        let delta = self.db_mut(database)?.table_mut(table)?.insert(rows).map_err(EngineError::from)?;
        self.notify(database, &delta)
    }

    pub fn update(
        &mut self,
        database: &str,
        table: &str,
        assignments: &[Assignment],
        predicate: &Expr,
    ) -> Result<(), EngineError> {
        self.reject_if_notifying()?;
        let db = self.db_mut(database)?;
        let t = db.table_mut(table)?;
        let mut changes = Vec::new();
        for row in t.scan() {
            if !predicate.eval(row).is_true() {
                continue;
            }
            let mut new_values = row.values.clone();
            for a in assignments {
                new_values[a.column] = a.value.eval_value(row);
            }
            changes.push((row.id, new_values));
        }
        let delta = t.update(changes).map_err(EngineError::from)?;
        self.notify(database, &delta)
    }

    pub fn delete(&mut self, database: &str, table: &str, predicate: &Expr) -> Result<(), EngineError> {
        self.reject_if_notifying()?;
        let db = self.db_mut(database)?;
        let t = db.table_mut(table)?;
        let ids: Vec<u64> = t.scan().filter(|r| predicate.eval(*r).is_true()).map(|r| r.id).collect();
        let delta = t.delete(&ids);
        self.notify(database, &delta)
    }

    pub fn select(&mut self, database: &str, plan: &Arc<Plan>) -> Result<Vec<Tuple>, EngineError> {
        let optimized = {
            let db = self.db(database)?;
            Optimizer::new(&db.catalog).optimize(plan.clone())
        };
        let db = self.db_mut(database)?;
        activate_demanded_gin_paths(&optimized, &mut db.tables)?;
        let db = self.db(database)?;
        executor::run(&optimized, &db.ctx())
    }

    /// As `select`, but encodes the result into a binary result buffer
    /// (spec.md §6.1) using a freshly built layout for this plan's output
    /// columns. Callers executing the same plan repeatedly should cache
    /// the returned layout themselves (or keep their own `LayoutCache`
    /// keyed by the plan's projection signature), since the layout only
    /// depends on output column shape, not on row contents.
    pub fn select_binary(&mut self, database: &str, plan: &Arc<Plan>) -> Result<(SchemaLayout, Vec<u8>), EngineError> {
        let output = output_schema(plan, &self.db(database)?.catalog)?;
        let layout = SchemaLayout::new(&output);
        let rows = self.select(database, plan)?;
        Ok((layout.clone(), codec::encode(&layout, &rows)))
    }

    pub fn explain(&self, database: &str, plan: &Arc<Plan>) -> Result<ExplainOutput, EngineError> {
        let db = self.db(database)?;
        let logical = format!("{plan:#?}");
        let optimized_plan = Optimizer::new(&db.catalog).optimize(plan.clone());
        let optimized = format!("{optimized_plan:#?}");
        Ok(ExplainOutput {
            physical: optimized.clone(),
            logical,
            optimized,
        })
    }

    pub fn observe(&mut self, database: &str, plan: Arc<Plan>) -> Result<u64, EngineError> {
        let db = self.db(database)?;
        let handle = ObserverHandle::new(plan, &db.ctx())?;
        Ok(self.register(HandleSlot::Observer {
            database: database.to_string(),
            handle,
        }))
    }

    pub fn trace(&mut self, database: &str, plan: Arc<Plan>) -> Result<u64, EngineError> {
        let db = self.db(database)?;
        let handle = IvmHandle::new(plan, &db.catalog)?;
        Ok(self.register(HandleSlot::Ivm {
            database: database.to_string(),
            handle,
        }))
    }

    pub fn handle_current_result(&self, id: u64) -> Result<Vec<Tuple>, EngineError> {
        match self.handles.get(&id) {
            Some(HandleSlot::Observer { handle, .. }) => Ok(handle.current_result().to_vec()),
            Some(HandleSlot::Ivm { handle, .. }) => Ok(handle.get_result()),
            None => Err(crate::error::HandleError::UseAfterDispose.into()),
        }
    }

    pub fn handle_subscribe_observer(
        &mut self,
        id: u64,
        callback: crate::observer::ObserverCallback,
    ) -> Result<u64, EngineError> {
        match self.handles.get_mut(&id) {
            Some(HandleSlot::Observer { handle, .. }) => Ok(handle.subscribe(callback)),
            _ => Err(crate::error::HandleError::UseAfterDispose.into()),
        }
    }

    pub fn handle_subscribe_ivm(
        &mut self,
        id: u64,
        callback: crate::ivm::IvmCallback,
    ) -> Result<u64, EngineError> {
        match self.handles.get_mut(&id) {
            Some(HandleSlot::Ivm { handle, .. }) => handle.subscribe(callback),
            _ => Err(crate::error::HandleError::UseAfterDispose.into()),
        }
    }

    pub fn handle_unsubscribe(&mut self, id: u64, subscriber_id: u64) {
        match self.handles.get_mut(&id) {
            Some(HandleSlot::Observer { handle, .. }) => handle.unsubscribe(subscriber_id),
            Some(HandleSlot::Ivm { handle, .. }) => handle.unsubscribe(subscriber_id),
            None => {}
        }
    }

    pub fn handle_dispose(&mut self, id: u64) {
        if let Some(slot) = self.handles.get_mut(&id) {
            match slot {
                HandleSlot::Observer { handle, .. } => handle.dispose(),
                HandleSlot::Ivm { handle, .. } => handle.dispose(),
            }
        }
        self.handles.remove(&id);
    }

    /// Runs a range-predicate select twice (once materialized, once into
    /// a binary buffer) and reports wall-clock cost of each half plus the
    /// serialization overhead as a percentage — a diagnostic, not a
    /// correctness-bearing command (spec.md §6.2).
    pub fn benchmark_range_query(
        &mut self,
        database: &str,
        plan: &Arc<Plan>,
    ) -> Result<BenchmarkResult, EngineError> {
        let query_start = Instant::now();
        let rows = self.select(database, plan)?;
        let query_ms = query_start.elapsed().as_secs_f64() * 1000.0;

        let db = self.db(database)?;
        let output = output_schema(plan, &db.catalog)?;
        let layout = SchemaLayout::new(&output);
        let serialize_start = Instant::now();
        let _buf = codec::encode(&layout, &rows);
        let serialize_ms = serialize_start.elapsed().as_secs_f64() * 1000.0;

        let total = query_ms + serialize_ms;
        let serialization_overhead_pct = if total > 0.0 { (serialize_ms / total) * 100.0 } else { 0.0 };
        Ok(BenchmarkResult {
            query_ms,
            serialize_ms,
            serialization_overhead_pct,
        })
    }

    fn db(&self, name: &str) -> Result<&Database, EngineError> {
        self.databases
            .get(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()).into())
    }

    fn db_mut(&mut self, name: &str) -> Result<&mut Database, EngineError> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()).into())
    }

    fn register(&mut self, slot: HandleSlot) -> u64 {
        let id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(id, slot);
        id
    }

    fn reject_if_notifying(&self) -> Result<(), EngineError> {
        if self.in_notification {
            return Err(RuntimeError::ReentrantWrite.into());
        }
        Ok(())
    }

    /// Fans a committed delta out to every observer/IVM handle scoped to
    /// `database` that watches the touched table. Sets `in_notification`
    /// for the duration so a callback's own write attempt is rejected
    /// rather than interleaved with this batch's propagation.
    fn notify(&mut self, database: &str, delta: &TableDelta) -> Result<(), EngineError> {
        if delta.is_empty() {
            return Ok(());
        }
        self.in_notification = true;
        let db_ctx_needed: Vec<u64> = self
            .handles
            .iter()
            .filter(|(_, slot)| match slot {
                HandleSlot::Observer { database: d, handle } => d == database && handle.is_watching(&delta.table),
                HandleSlot::Ivm { database: d, handle } => d == database && handle.is_watching(&delta.table),
            })
            .map(|(id, _)| *id)
            .collect();

        let mut result = Ok(());
        for id in db_ctx_needed {
            let db = match self.databases.get(database) {
                Some(db) => db,
                None => continue,
            };
            // SAFETY-free workaround for the observer's borrow of `ctx`
            // needing `&self.databases` while `self.handles` is borrowed
            // mutably: build the context first, then take the handle out.
            let ctx = db.ctx();
            if let Some(slot) = self.handles.get_mut(&id) {
                match slot {
                    HandleSlot::Observer { handle, .. } => {
                        if let Err(e) = handle.notify(&ctx) {
                            result = Err(e);
                        }
                    }
                    HandleSlot::Ivm { handle, .. } => {
                        handle.notify_write(delta);
                    }
                }
            }
        }
        self.in_notification = false;
        result
    }
}

/// Activates every GIN path the optimized plan's access-path nodes demand,
/// backfilling from the table's current rows on first demand (spec.md §4.2:
/// "built lazily on first demanding query and then maintained on every
/// subsequent write"). Recurses through the whole tree since a demanded
/// path can appear under a join or a subtree the optimizer left untouched.
fn activate_demanded_gin_paths(plan: &Plan, tables: &mut HashMap<String, Table>) -> Result<(), EngineError> {
    match plan {
        Plan::GinIndexScan { table, index, path, .. } => {
            let t = tables.get_mut(table).ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
            t.ensure_gin_path(index, path.clone())?;
        }
        Plan::GinIndexScanMulti { table, index, conjuncts } => {
            let t = tables.get_mut(table).ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
            for (path, _) in conjuncts {
                t.ensure_gin_path(index, path.clone())?;
            }
        }
        _ => {}
    }
    for child in plan.children() {
        activate_demanded_gin_paths(child, tables)?;
    }
    Ok(())
}

/// Resolves the `(name, type)` shape a plan produces, walking the same
/// structure `optimizer::plan_arity` uses for column counts but also
/// carrying names/types for the binary codec's layout builder.
fn output_schema(plan: &Plan, catalog: &Catalog) -> Result<Vec<(String, DataType)>, EngineError> {
    match plan {
        Plan::Scan { table }
        | Plan::IndexGet { table, .. }
        | Plan::IndexScan { table, .. }
        | Plan::IndexMultiGet { table, .. }
        | Plan::GinIndexScan { table, .. }
        | Plan::GinIndexScanMulti { table, .. } => {
            let schema = catalog.get(table)?;
            Ok(schema.columns.iter().map(|c| (c.name.clone(), c.data_type)).collect())
        }
        Plan::Filter { child, .. }
        | Plan::Sort { child, .. }
        | Plan::Limit { child, .. }
        | Plan::Offset { child, .. }
        | Plan::TopK { child, .. } => output_schema(child, catalog),
        Plan::Project { columns, child } => {
            let base = output_schema(child, catalog)?;
            Ok(columns.iter().map(|&i| base[i].clone()).collect())
        }
        Plan::Join { left, right, .. } => {
            let mut out = output_schema(left, catalog)?;
            out.extend(output_schema(right, catalog)?);
            Ok(out)
        }
        Plan::Aggregate { aggs, .. } => Ok(aggs.iter().map(|a| (a.output_name.clone(), DataType::Float64)).collect()),
        Plan::GroupBy { keys, aggs, child } => {
            let base = output_schema(child, catalog)?;
            let mut out: Vec<(String, DataType)> = keys.iter().map(|&i| base[i].clone()).collect();
            out.extend(aggs.iter().map(|a| (a.output_name.clone(), DataType::Float64)));
            Ok(out)
        }
    }
}

/// A successful batch's `{added, removed}` IVM deltas, grouped by which
/// sink they came from — not part of the public surface above (the raw
/// `IvmDelta` is what subscriber callbacks receive) but kept here since
/// it is the natural return shape for a host replaying deliveries; no
/// current call site constructs one outside tests.
#[allow(dead_code)]
struct DeliveryLog(Vec<(u64, IvmDelta)>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanBuilder;
    use crate::schema::ColumnDef;

    fn items_schema() -> TableSchema {
        TableSchema::new(
            "items",
            vec![
                ColumnDef::new("id", DataType::Int64, false),
                ColumnDef::new("name", DataType::String, false),
            ],
            "id",
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn primary_key_selection_end_to_end() {
        let mut engine = Engine::new();
        engine.create_database("default").unwrap();
        engine.create_table("default", items_schema()).unwrap();
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

    #[test]
    fn gin_path_not_declared_eager_activates_on_first_demanding_query() {
        use crate::schema::IndexDef;
        use crate::value::JsonPath;
        use serde_json::json;

        let schema = TableSchema::new(
            "docs",
            vec![
                ColumnDef::new("id", DataType::Int64, false),
                ColumnDef::new("body", DataType::Jsonb, false),
            ],
            "id",
            vec![IndexDef::gin("docs_body_gin", "body")],
        )
        .unwrap();

        let mut engine = Engine::new();
        engine.create_database("default").unwrap();
        engine.create_table("default", schema).unwrap();
        engine
            .insert(
                "default",
                "docs",
                vec![
                    vec![Value::Int64(1), Value::Jsonb(json!({"category": "tech"}))],
                    vec![Value::Int64(2), Value::Jsonb(json!({"category": "news"}))],
                ],
            )
            .unwrap();

        let path = JsonPath::parse("$.category").unwrap();
        let plan = PlanBuilder::scan("docs")
            .filter(Expr::col(1).json_path(path).eq(Expr::lit(Value::string("tech"))))
            .build();
        let explain = engine.explain("default", &plan).unwrap();
        assert!(explain.optimized.contains("GinIndexScan"));

        let rows = engine.select("default", &plan).unwrap();
        assert_eq!(rows, vec![vec![Value::Int64(1), Value::Jsonb(json!({"category": "tech"}))]]);
    }

    #[test]
    fn write_inside_notification_is_rejected() {
        let mut engine = Engine::new();
        engine.create_database("default").unwrap();
        engine.create_table("default", items_schema()).unwrap();
        engine.in_notification = true;
        let err = engine
            .insert("default", "items", vec![vec![Value::Int64(1), Value::string("a")]])
            .unwrap_err();
        assert_eq!(err, EngineError::Runtime(RuntimeError::ReentrantWrite));
    }

    #[test]
    fn observe_reflects_writes_through_the_engine() {
        let mut engine = Engine::new();
        engine.create_database("default").unwrap();
        engine.create_table("default", items_schema()).unwrap();
        let plan = PlanBuilder::scan("items").build();
        let handle_id = engine.observe("default", plan).unwrap();
        engine
            .insert("default", "items", vec![vec![Value::Int64(1), Value::string("a")]])
            .unwrap();
        assert_eq!(engine.handle_current_result(handle_id).unwrap().len(), 1);
    }

    #[test]
    fn trace_rejects_and_disposes() {
        let mut engine = Engine::new();
        engine.create_database("default").unwrap();
        engine.create_table("default", items_schema()).unwrap();
        let plan = PlanBuilder::scan("items").limit(1).build();
        assert!(engine.trace("default", plan).is_err());

        let plan = PlanBuilder::scan("items").build();
        let id = engine.trace("default", plan).unwrap();
        engine.handle_dispose(id);
        assert!(engine.handle_current_result(id).is_err());
    }
}
