//! Incremental view maintenance engine (C11, spec.md §4.6 — the
//! centerpiece).
//!
//! `trace(plan)` compiles a logical plan restricted to
//! `{Scan, Filter, Project, Join}` into a small dataflow graph: an arena
//! of nodes, each holding the signed multiset it currently produces.
//! A write batch is injected at the matching `Scan` node(s) and
//! propagated forward; every node computes its own output delta from its
//! child's delta (and, for `Join`, from a per-key arrangement of each
//! side) without ever re-scanning its full input. Cost per write is
//! `O(|Δ|)` plus the number of join matches it touches, never the size
//! of the tables.
//!
//! Delta propagation runs in two passes over the arena: the first
//! computes every node's delta from its children's deltas and the
//! *pre-batch* state of its own arrangements (so a `Join` never sees a
//! half-updated sibling), the second applies all the deltas. This is
//! algebraically the same join formula spec.md §4.6 states in terms of
//! post-update arrangements plus a double-count correction — expressed
//! here with pre-update arrangements instead, which needs no correction
//! term and removes the update-ordering subtlety entirely.

use crate::changelog::TableDelta;
use crate::error::{EngineError, HandleError, PlanError};
use crate::expr::Expr;
use crate::plan::{JoinKind, JoinOn, Plan};
use crate::schema::Catalog;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A tuple flowing through the dataflow graph; shares shape with the
/// executor's `Tuple` but kept separate since IVM tuples are never
/// fetched by row id.
pub type Tuple = Vec<Value>;

/// A signed multiset: `count` may be negative mid-batch but every entry
/// retained in a node's `current` arrangement always has `count > 0`.
type Multiset = HashMap<Tuple, i64>;

enum NodeKind {
    Scan(String),
    Filter(Expr),
    Project(Vec<usize>),
    /// `right_arity` is the right child's output width, resolved once at
    /// build time from the catalog — needed so a left-join's padded,
    /// unmatched-row tuples come out the same width as its matched rows
    /// (`combine`'s `left_arity + right_arity`), not a fixed stand-in.
    Join(JoinKind, JoinOn, usize),
}

struct Node {
    kind: NodeKind,
    children: Vec<usize>,
    /// This node's own output, as last propagated.
    current: Multiset,
    /// Populated only for `Join` nodes: each side's rows grouped by join
    /// key, maintained incrementally alongside `current`.
    left_by_key: HashMap<Value, Multiset>,
    right_by_key: HashMap<Value, Multiset>,
}

impl Node {
    fn leaf(kind: NodeKind) -> Self {
        Node {
            kind,
            children: vec![],
            current: HashMap::new(),
            left_by_key: HashMap::new(),
            right_by_key: HashMap::new(),
        }
    }
}

fn merge_into(target: &mut Multiset, delta: &Multiset) {
    for (tuple, mult) in delta {
        let entry = target.entry(tuple.clone()).or_insert(0);
        *entry += mult;
        if *entry == 0 {
            target.remove(tuple);
        }
    }
}

fn add_delta(target: &mut Multiset, tuple: Tuple, mult: i64) {
    if mult == 0 {
        return;
    }
    let entry = target.entry(tuple).or_insert(0);
    *entry += mult;
}

/// An incremental view: an arena-backed dataflow graph plus the sink
/// subscribers watching its root's output.
pub struct IvmTrace {
    arena: Vec<Node>,
    root: usize,
    scan_nodes: HashMap<String, Vec<usize>>,
}

impl IvmTrace {
    /// Compile `plan` into a dataflow graph. Only `Scan`, `Filter`,
    /// `Project` and `Join(Inner|Left)` are incrementalizable; anything
    /// else (sorting, limiting, aggregation, or a physical access-path
    /// node introduced by the optimizer) is rejected.
    pub fn build(plan: &Plan, catalog: &Catalog) -> Result<Self, PlanError> {
        let mut arena = Vec::new();
        let root = build_node(plan, catalog, &mut arena)?;
        let mut scan_nodes: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, node) in arena.iter().enumerate() {
            if let NodeKind::Scan(table) = &node.kind {
                scan_nodes.entry(table.clone()).or_default().push(idx);
            }
        }
        Ok(IvmTrace { arena, root, scan_nodes })
    }

    pub fn is_watching(&self, table: &str) -> bool {
        self.scan_nodes.contains_key(table)
    }

    /// The sink's current rows (positive-multiplicity tuples only).
    pub fn current_rows(&self) -> Vec<Tuple> {
        self.arena[self.root].current.keys().cloned().collect()
    }

    /// Inject one table's committed delta and propagate it through the
    /// graph, returning the net change to the sink: rows that crossed
    /// from zero to nonzero multiplicity (`added`) and rows that crossed
    /// from nonzero to zero (`removed`). A row whose multiplicity changed
    /// but stayed nonzero (a duplicate insert/delete) is reported as
    /// neither, matching the "exactly the transitions" dataflow model of
    /// §4.6. Returns `None` if this trace does not watch `table`.
    pub fn apply(&mut self, delta: &TableDelta) -> Option<IvmDelta> {
        let scan_idxs = self.scan_nodes.get(&delta.table)?.clone();
        let mut injected: Multiset = HashMap::new();
        for (row, mult) in &delta.changes {
            add_delta(&mut injected, row.values.clone(), *mult);
        }

        // Pass 1: compute every node's delta from pre-batch state only.
        let mut deltas: Vec<Multiset> = vec![HashMap::new(); self.arena.len()];
        for idx in &scan_idxs {
            deltas[*idx] = injected.clone();
        }
        for idx in 0..self.arena.len() {
            if scan_idxs.contains(&idx) {
                continue;
            }
            deltas[idx] = self.compute_delta(idx, &deltas);
        }

        // Snapshot the sink's pre-batch state to classify transitions.
        let root_delta = deltas[self.root].clone();
        let mut ivm_delta = IvmDelta::default();
        for (tuple, mult) in &root_delta {
            let before = *self.arena[self.root].current.get(tuple).unwrap_or(&0);
            let after = before + mult;
            if before == 0 && after != 0 {
                ivm_delta.added.push(tuple.clone());
            } else if before != 0 && after == 0 {
                ivm_delta.removed.push(tuple.clone());
            }
        }

        // Pass 2: apply every node's delta, updating arrangements.
        for idx in 0..self.arena.len() {
            self.apply_node_delta(idx, &deltas);
        }

        Some(ivm_delta)
    }

    fn compute_delta(&self, idx: usize, deltas: &[Multiset]) -> Multiset {
        match &self.arena[idx].kind {
            NodeKind::Scan(_) => HashMap::new(),
            NodeKind::Filter(predicate) => {
                let child = self.arena[idx].children[0];
                let mut out = HashMap::new();
                for (tuple, mult) in &deltas[child] {
                    if predicate.eval(tuple).is_true() {
                        add_delta(&mut out, tuple.clone(), *mult);
                    }
                }
                out
            }
            NodeKind::Project(cols) => {
                let child = self.arena[idx].children[0];
                let mut out = HashMap::new();
                for (tuple, mult) in &deltas[child] {
                    let projected: Tuple = cols.iter().map(|&c| tuple[c].clone()).collect();
                    add_delta(&mut out, projected, *mult);
                }
                out
            }
            NodeKind::Join(kind, on, right_arity) => {
                let left_idx = self.arena[idx].children[0];
                let right_idx = self.arena[idx].children[1];
                let left_delta = &deltas[left_idx];
                let right_delta = &deltas[right_idx];
                self.join_delta(idx, *kind, *on, *right_arity, left_delta, right_delta)
            }
        }
    }

    /// `ΔL ⋈ R + L ⋈ ΔR + ΔL ⋈ ΔR`, all arrangements pre-batch — the
    /// textbook bilinear expansion of `Δ(L ⋈ R)`, equivalent to spec.md
    /// §4.6's post-update-plus-correction form but needs no correction
    /// term since nothing here has been updated yet.
    fn join_delta(
        &self,
        join_idx: usize,
        kind: JoinKind,
        on: JoinOn,
        right_arity: usize,
        left_delta: &Multiset,
        right_delta: &Multiset,
    ) -> Multiset {
        let node = &self.arena[join_idx];
        let mut out: HashMap<Tuple, i64> = HashMap::new();

        // ΔL ⋈ R_current
        for (ltuple, lmult) in left_delta {
            let key = &ltuple[on.left_col];
            if let Some(matches) = node.right_by_key.get(key) {
                for (rtuple, rmult) in matches {
                    add_delta(&mut out, combine(ltuple, rtuple), lmult * rmult);
                }
            }
        }
        // L_current ⋈ ΔR
        for (rtuple, rmult) in right_delta {
            let key = &rtuple[on.right_col];
            if let Some(matches) = node.left_by_key.get(key) {
                for (ltuple, lmult) in matches {
                    add_delta(&mut out, combine(ltuple, rtuple), lmult * rmult);
                }
            }
        }
        // ΔL ⋈ ΔR
        for (ltuple, lmult) in left_delta {
            let key = &ltuple[on.left_col];
            for (rtuple, rmult) in right_delta {
                if &rtuple[on.right_col] == key {
                    add_delta(&mut out, combine(ltuple, rtuple), lmult * rmult);
                }
            }
        }

        if kind == JoinKind::Left {
            self.left_join_padding(join_idx, on, right_arity, left_delta, right_delta, &mut out);
        }

        out
    }

    /// Null-padded-row bookkeeping for `LeftJoin`. For every join key
    /// touched this batch, compares the pre-batch and post-batch count of
    /// matching right rows:
    /// - stayed at zero: new/removed left rows get matching padded-row
    ///   deltas.
    /// - zero -> nonzero (key gained its first match): every pre-existing
    ///   left row for that key has its padded row retracted (the real
    ///   joined rows were already added by `join_delta` above).
    /// - nonzero -> zero (a delete removed the last matching right row):
    ///   every left row for that key gets a padded row added (the
    ///   symmetric case of the above — spec.md §4.6 states the first
    ///   direction explicitly; this mirrors it for full correctness).
    /// - stayed nonzero: no padding involved.
    fn left_join_padding(
        &self,
        join_idx: usize,
        on: JoinOn,
        right_arity: usize,
        left_delta: &Multiset,
        right_delta: &Multiset,
        out: &mut Multiset,
    ) {
        let node = &self.arena[join_idx];
        let mut touched_keys: Vec<Value> = Vec::new();
        for tuple in left_delta.keys() {
            touched_keys.push(tuple[on.left_col].clone());
        }
        for tuple in right_delta.keys() {
            touched_keys.push(tuple[on.right_col].clone());
        }
        touched_keys.sort();
        touched_keys.dedup();

        for key in touched_keys {
            let right_before: i64 = node
                .right_by_key
                .get(&key)
                .map(|m| m.values().sum())
                .unwrap_or(0);
            let right_delta_for_key: i64 = right_delta
                .iter()
                .filter(|(t, _)| t[on.right_col] == key)
                .map(|(_, m)| m)
                .sum();
            let right_after = right_before + right_delta_for_key;

            let existing_left: Vec<(&Tuple, &i64)> = node
                .left_by_key
                .get(&key)
                .map(|m| m.iter().collect())
                .unwrap_or_default();
            let new_left: Vec<(&Tuple, &i64)> = left_delta
                .iter()
                .filter(|(t, _)| t[on.left_col] == key)
                .collect();

            if right_before == 0 && right_after == 0 {
                for (ltuple, lmult) in &new_left {
                    add_delta(out, padded(ltuple, right_arity), **lmult);
                }
            } else if right_before == 0 && right_after > 0 {
                for (ltuple, lmult) in &existing_left {
                    add_delta(out, padded(ltuple, right_arity), -**lmult);
                }
                // new_left tuples never had a padded row to retract; they
                // go straight to the real matched rows added above.
            } else if right_before > 0 && right_after == 0 {
                for (ltuple, lmult) in existing_left.iter().chain(new_left.iter()) {
                    add_delta(out, padded(ltuple, right_arity), **lmult);
                }
            }
            // right_before > 0 && right_after > 0: always matched, nothing to pad.
        }
    }

    fn apply_node_delta(&mut self, idx: usize, deltas: &[Multiset]) {
        let delta = deltas[idx].clone();
        let node = &mut self.arena[idx];
        if let NodeKind::Join(_, on, _) = &node.kind {
            let on = *on;
            let left_idx = node.children[0];
            let right_idx = node.children[1];
            let left_delta = deltas[left_idx].clone();
            let right_delta = deltas[right_idx].clone();
            for (tuple, mult) in &left_delta {
                let key = tuple[on.left_col].clone();
                let bucket = node.left_by_key.entry(key.clone()).or_default();
                let entry = bucket.entry(tuple.clone()).or_insert(0);
                *entry += mult;
                if *entry == 0 {
                    bucket.remove(tuple);
                }
                if bucket.is_empty() {
                    node.left_by_key.remove(&key);
                }
            }
            for (tuple, mult) in &right_delta {
                let key = tuple[on.right_col].clone();
                let bucket = node.right_by_key.entry(key.clone()).or_default();
                let entry = bucket.entry(tuple.clone()).or_insert(0);
                *entry += mult;
                if *entry == 0 {
                    bucket.remove(tuple);
                }
                if bucket.is_empty() {
                    node.right_by_key.remove(&key);
                }
            }
        }
        merge_into(&mut node.current, &delta);
    }
}

fn combine(l: &Tuple, r: &Tuple) -> Tuple {
    l.iter().chain(r.iter()).cloned().collect()
}

/// Pad an unmatched left row out to `combine`'s full width, so every tuple
/// a `LeftJoin` node emits — matched or padded — has the same
/// `left_arity + right_arity` shape.
fn padded(l: &Tuple, right_arity: usize) -> Tuple {
    let mut out = l.clone();
    out.extend(std::iter::repeat(Value::Null).take(right_arity));
    out
}

fn build_node(plan: &Plan, catalog: &Catalog, arena: &mut Vec<Node>) -> Result<usize, PlanError> {
    let node = match plan {
        Plan::Scan { table } => Node::leaf(NodeKind::Scan(table.clone())),
        Plan::Filter { predicate, child } => {
            let c = build_node(child, catalog, arena)?;
            Node {
                kind: NodeKind::Filter(predicate.clone()),
                children: vec![c],
                current: HashMap::new(),
                left_by_key: HashMap::new(),
                right_by_key: HashMap::new(),
            }
        }
        Plan::Project { columns, child } => {
            let c = build_node(child, catalog, arena)?;
            Node {
                kind: NodeKind::Project(columns.clone()),
                children: vec![c],
                current: HashMap::new(),
                left_by_key: HashMap::new(),
                right_by_key: HashMap::new(),
            }
        }
        Plan::Join { kind, on, left, right } => {
            let l = build_node(left, catalog, arena)?;
            let r = build_node(right, catalog, arena)?;
            let right_arity = plan_arity(right, catalog)?;
            Node {
                kind: NodeKind::Join(*kind, *on, right_arity),
                children: vec![l, r],
                current: HashMap::new(),
                left_by_key: HashMap::new(),
                right_by_key: HashMap::new(),
            }
        }
        other => {
            return Err(PlanError::NotIncrementalizable(format!(
                "{} is not incrementalizable; only Scan, Filter, Project and Join are",
                plan_node_name(other)
            )))
        }
    };
    arena.push(node);
    Ok(arena.len() - 1)
}

/// Output width of an incrementalizable plan subtree, used to size a
/// `LeftJoin`'s padded rows to match its matched rows' width.
fn plan_arity(plan: &Plan, catalog: &Catalog) -> Result<usize, PlanError> {
    match plan {
        Plan::Scan { table } => catalog
            .get(table)
            .map(|s| s.arity())
            .map_err(|e| PlanError::UnsupportedOperation(e.to_string())),
        Plan::Filter { child, .. } => plan_arity(child, catalog),
        Plan::Project { columns, .. } => Ok(columns.len()),
        Plan::Join { left, right, .. } => Ok(plan_arity(left, catalog)? + plan_arity(right, catalog)?),
        other => Err(PlanError::NotIncrementalizable(format!(
            "{} is not incrementalizable; only Scan, Filter, Project and Join are",
            plan_node_name(other)
        ))),
    }
}

fn plan_node_name(plan: &Plan) -> &'static str {
    match plan {
        Plan::Scan { .. } => "Scan",
        Plan::IndexGet { .. } => "IndexGet",
        Plan::IndexScan { .. } => "IndexScan",
        Plan::IndexMultiGet { .. } => "IndexMultiGet",
        Plan::GinIndexScan { .. } => "GinIndexScan",
        Plan::GinIndexScanMulti { .. } => "GinIndexScanMulti",
        Plan::Filter { .. } => "Filter",
        Plan::Project { .. } => "Project",
        Plan::Sort { .. } => "Sort",
        Plan::Limit { .. } => "Limit",
        Plan::Offset { .. } => "Offset",
        Plan::TopK { .. } => "TopK",
        Plan::Join { .. } => "Join",
        Plan::Aggregate { .. } => "Aggregate",
        Plan::GroupBy { .. } => "GroupBy",
    }
}

/// The per-subscriber delivery for one applied write batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IvmDelta {
    pub added: Vec<Tuple>,
    pub removed: Vec<Tuple>,
}

pub type IvmCallback = Box<dyn FnMut(&IvmDelta) + Send>;

struct Subscriber {
    id: u64,
    callback: IvmCallback,
}

/// A live incrementally-maintained view: a compiled [`IvmTrace`] plus the
/// subscribers watching its sink. `Created -> Active` on construction;
/// `subscribe`/`unsubscribe`/`notify_write` operate while `Active`;
/// `dispose` moves to `Disposed`, after which `subscribe` fails with
/// [`HandleError::UseAfterDispose`] and `unsubscribe` stays a silent
/// no-op.
pub struct IvmHandle {
    plan: Arc<Plan>,
    trace: IvmTrace,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: AtomicU64,
    disposed: bool,
}

impl std::fmt::Debug for IvmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IvmHandle")
            .field("plan", &self.plan)
            .field("subscriber_count", &self.subscribers.len())
            .field("next_subscriber_id", &self.next_subscriber_id)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl IvmHandle {
    pub fn new(plan: Arc<Plan>, catalog: &Catalog) -> Result<Self, PlanError> {
        let trace = IvmTrace::build(&plan, catalog)?;
        Ok(IvmHandle {
            plan,
            trace,
            subscribers: Vec::new(),
            next_subscriber_id: AtomicU64::new(1),
            disposed: false,
        })
    }

    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    pub fn is_watching(&self, table: &str) -> bool {
        self.trace.is_watching(table)
    }

    pub fn get_result(&self) -> Vec<Tuple> {
        self.trace.current_rows()
    }

    pub fn subscribe(&mut self, callback: IvmCallback) -> Result<u64, EngineError> {
        if self.disposed {
            return Err(HandleError::UseAfterDispose.into());
        }
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.push(Subscriber { id, callback });
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: u64) {
        self.subscribers.retain(|s| s.id != id);
    }

    /// Apply one table's committed delta, propagate it through the
    /// dataflow graph, and deliver `{added, removed}` to every subscriber
    /// exactly once, in subscription order. A no-op if this view does not
    /// read from `delta.table` or the delta produced no sink-visible
    /// change.
    pub fn notify_write(&mut self, delta: &TableDelta) {
        if self.disposed {
            return;
        }
        let Some(ivm_delta) = self.trace.apply(delta) else {
            return;
        };
        if ivm_delta.added.is_empty() && ivm_delta.removed.is_empty() {
            return;
        }
        for sub in &mut self.subscribers {
            (sub.callback)(&ivm_delta);
        }
    }

    pub fn dispose(&mut self) {
        self.disposed = true;
        self.subscribers.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::plan::{JoinOn, PlanBuilder};
    use crate::schema::ColumnDef;
    use crate::value::{DataType, Row};

    fn row(id: u64, values: Vec<Value>) -> Row {
        Row::new(id, values)
    }

    /// A catalog with `items` (2 cols), `orders` (2 cols) and `customers`
    /// (2 cols) — enough for every join-arity lookup the tests below need;
    /// tests over a single `Scan` never hit the arity resolver.
    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.create_table(
            crate::schema::TableSchema::new(
                "items",
                vec![
                    ColumnDef::new("id", DataType::Int64, false),
                    ColumnDef::new("value", DataType::Int64, false),
                ],
                "id",
                vec![],
            )
            .unwrap(),
        )
        .unwrap();
        c.create_table(
            crate::schema::TableSchema::new(
                "orders",
                vec![
                    ColumnDef::new("id", DataType::Int64, false),
                    ColumnDef::new("customer_id", DataType::Int64, false),
                ],
                "id",
                vec![],
            )
            .unwrap(),
        )
        .unwrap();
        c.create_table(
            crate::schema::TableSchema::new(
                "customers",
                vec![
                    ColumnDef::new("id", DataType::Int64, false),
                    ColumnDef::new("name", DataType::String, false),
                ],
                "id",
                vec![],
            )
            .unwrap(),
        )
        .unwrap();
        c
    }

    fn insert_delta(table: &str, rows: Vec<Row>) -> TableDelta {
        let mut d = TableDelta::new(table);
        for r in rows {
            d.push_insert(r);
        }
        d
    }

    fn delete_delta(table: &str, rows: Vec<Row>) -> TableDelta {
        let mut d = TableDelta::new(table);
        for r in rows {
            d.push_delete(r);
        }
        d
    }

    #[test]
    fn scan_filter_project_propagates_matching_inserts_only() {
        let plan = PlanBuilder::scan("items")
            .filter(Expr::col(1).gt(Expr::lit(10)))
            .project(vec![0])
            .build();
        let mut handle = IvmHandle::new(plan, &catalog()).unwrap();

        let delta = insert_delta(
            "items",
            vec![
                row(1, vec![Value::Int64(1), Value::Int64(5)]),
                row(2, vec![Value::Int64(2), Value::Int64(20)]),
            ],
        );
        handle.notify_write(&delta);
        let result = handle.get_result();
        assert_eq!(result, vec![vec![Value::Int64(2)]]);
    }

    #[test]
    fn unrelated_table_write_is_a_no_op() {
        let plan = PlanBuilder::scan("items").build();
        let mut handle = IvmHandle::new(plan, &catalog()).unwrap();
        handle.notify_write(&insert_delta("other", vec![row(1, vec![Value::Int64(1)])]));
        assert!(handle.get_result().is_empty());
    }

    #[test]
    fn inner_join_delta_matches_new_rows_on_both_sides() {
        let plan = PlanBuilder::scan("orders")
            .join(
                JoinKind::Inner,
                JoinOn { left_col: 1, right_col: 0 },
                PlanBuilder::scan("customers"),
            )
            .build();
        let mut handle = IvmHandle::new(plan, &catalog()).unwrap();

        handle.notify_write(&insert_delta(
            "customers",
            vec![row(1, vec![Value::Int64(1), Value::string("alice")])],
        ));
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired_clone = fired.clone();
        handle
            .subscribe(Box::new(move |d| {
                fired_clone.fetch_add(d.added.len(), Ordering::SeqCst);
            }))
            .unwrap();

        handle.notify_write(&insert_delta(
            "orders",
            vec![row(10, vec![Value::Int64(10), Value::Int64(1)])],
        ));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(handle.get_result().len(), 1);
    }

    #[test]
    fn inner_join_retracts_when_matching_row_is_deleted() {
        let plan = PlanBuilder::scan("orders")
            .join(
                JoinKind::Inner,
                JoinOn { left_col: 1, right_col: 0 },
                PlanBuilder::scan("customers"),
            )
            .build();
        let mut handle = IvmHandle::new(plan, &catalog()).unwrap();
        let customer = row(1, vec![Value::Int64(1), Value::string("alice")]);
        handle.notify_write(&insert_delta("customers", vec![customer.clone()]));
        handle.notify_write(&insert_delta(
            "orders",
            vec![row(10, vec![Value::Int64(10), Value::Int64(1)])],
        ));
        assert_eq!(handle.get_result().len(), 1);

        handle.notify_write(&delete_delta("customers", vec![customer]));
        assert!(handle.get_result().is_empty());
    }

    #[test]
    fn left_join_pads_unmatched_left_rows_and_unpads_on_match() {
        let plan = PlanBuilder::scan("orders")
            .join(
                JoinKind::Left,
                JoinOn { left_col: 1, right_col: 0 },
                PlanBuilder::scan("customers"),
            )
            .build();
        let mut handle = IvmHandle::new(plan, &catalog()).unwrap();

        handle.notify_write(&insert_delta(
            "orders",
            vec![row(10, vec![Value::Int64(10), Value::Int64(1)])],
        ));
        let result = handle.get_result();
        assert_eq!(result.len(), 1);
        // padded out to orders' 2 cols + customers' 2 cols, not a single marker
        assert_eq!(result[0], vec![Value::Int64(10), Value::Int64(1), Value::Null, Value::Null]);

        handle.notify_write(&insert_delta(
            "customers",
            vec![row(1, vec![Value::Int64(1), Value::string("alice")])],
        ));
        let result = handle.get_result();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 4);
        assert_ne!(result[0].last(), Some(&Value::Null));
    }

    #[test]
    fn trace_rejects_non_incrementalizable_plans() {
        let plan = PlanBuilder::scan("items").limit(5).build();
        let err = IvmHandle::new(plan, &catalog()).unwrap_err();
        assert!(matches!(err, PlanError::NotIncrementalizable(_)));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let plan = PlanBuilder::scan("items").build();
        let mut handle = IvmHandle::new(plan, &catalog()).unwrap();
        let id = handle.subscribe(Box::new(|_| {})).unwrap();
        handle.unsubscribe(id);
        handle.unsubscribe(id);
    }

    #[test]
    fn subscribe_after_dispose_is_rejected() {
        let plan = PlanBuilder::scan("items").build();
        let mut handle = IvmHandle::new(plan, &catalog()).unwrap();
        handle.dispose();
        let err = handle.subscribe(Box::new(|_| {})).unwrap_err();
        assert_eq!(err, EngineError::Handle(HandleError::UseAfterDispose));
    }
}
