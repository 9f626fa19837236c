//! Pull-based executor (C8).
//!
//! Every operator exposes "produce next tuple or EOF" through the
//! [`Operator`] trait. [`build`] compiles an (optimized) [`Plan`] into an
//! operator tree over a snapshot of the live tables; [`run`] drains it
//! into a materialized `Vec<Tuple>`. The binary-buffer sink (C9) drains
//! the same tree, so the row-production logic lives exactly once here.

mod aggregate;

use crate::error::{EngineError, SchemaError};
use crate::expr::Expr;
use crate::plan::{JoinKind, Plan, SortDir};
use crate::schema::Catalog;
use crate::storage::Table;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

pub use aggregate::{compute_aggregate, compute_group_key};

/// A tuple flowing through the executor: positional column values, no
/// longer tied to a row-id once past the leaf scan operators.
pub type Tuple = Vec<Value>;

/// A pull-based physical operator.
pub trait Operator {
    fn next(&mut self) -> Option<Tuple>;
}

pub struct ExecContext<'a> {
    pub catalog: &'a Catalog,
    pub tables: &'a HashMap<String, Table>,
}

impl<'a> ExecContext<'a> {
    fn table(&self, name: &str) -> Result<&'a Table, EngineError> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()).into())
    }
}

/// Compile `plan` into an operator tree and drain it fully.
pub fn run(plan: &Plan, ctx: &ExecContext) -> Result<Vec<Tuple>, EngineError> {
    let mut op = build(plan, ctx)?;
    let mut out = Vec::new();
    while let Some(t) = op.next() {
        out.push(t);
    }
    Ok(out)
}

/// Index-access plan nodes only ever carry literal keys — the optimizer's
/// index-selection rule is the sole producer of these nodes and always
/// builds them from `Expr::Lit`.
fn eval_lit(e: &Expr) -> Value {
    match e {
        Expr::Lit(v) => v.clone(),
        _ => unreachable!("index access keys are always literals"),
    }
}

fn build<'a>(plan: &Plan, ctx: &ExecContext<'a>) -> Result<Box<dyn Operator + 'a>, EngineError> {
    match plan {
        Plan::Scan { table } => {
            let t = ctx.table(table)?;
            Ok(Box::new(TableScan {
                rows: t.scan().map(|r| r.values.clone()).collect::<Vec<_>>().into_iter(),
            }))
        }
        Plan::IndexGet { table, index, key } => {
            let t = ctx.table(table)?;
            let key = eval_lit(key);
            let id = match index {
                None => t.pk_index().get(&key),
                Some(name) => t.unique_index(name).and_then(|i| i.get(&key)),
            };
            let rows = id
                .and_then(|id| t.get(id))
                .map(|r| vec![r.values.clone()])
                .unwrap_or_default();
            Ok(Box::new(TableScan {
                rows: rows.into_iter(),
            }))
        }
        Plan::IndexScan {
            table,
            index,
            lo,
            lo_inclusive,
            hi,
            hi_inclusive,
        } => {
            let t = ctx.table(table)?;
            let idx = t
                .ordered_index(index)
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: table.clone(),
                    column: index.clone(),
                })?;
            let lo_value = lo.as_ref().map(eval_lit);
            let hi_value = hi.as_ref().map(eval_lit);
            let ids = idx.range_bounds(
                lo_value.as_ref(),
                *lo_inclusive,
                hi_value.as_ref(),
                *hi_inclusive,
            );
            let rows = ids
                .into_iter()
                .filter_map(|id| t.get(id))
                .map(|r| r.values.clone())
                .collect::<Vec<_>>();
            Ok(Box::new(TableScan {
                rows: rows.into_iter(),
            }))
        }
        Plan::IndexMultiGet { table, index, keys } => {
            let t = ctx.table(table)?;
            let idx = t
                .ordered_index(index)
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: table.clone(),
                    column: index.clone(),
                })?;
            let keys: Vec<Value> = keys.iter().map(eval_lit).collect();
            let ids = idx.in_list(&keys);
            let rows = ids
                .into_iter()
                .filter_map(|id| t.get(id))
                .map(|r| r.values.clone())
                .collect::<Vec<_>>();
            Ok(Box::new(TableScan {
                rows: rows.into_iter(),
            }))
        }
        Plan::GinIndexScan {
            table,
            index,
            path,
            value,
        } => {
            let t = ctx.table(table)?;
            let gin = t
                .gin_index(index)
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: table.clone(),
                    column: index.clone(),
                })?;
            let value = eval_lit(value);
            let ids = gin.get(path, &value);
            let rows = ids
                .into_iter()
                .filter_map(|id| t.get(id))
                .map(|r| r.values.clone())
                .collect::<Vec<_>>();
            Ok(Box::new(TableScan {
                rows: rows.into_iter(),
            }))
        }
        Plan::GinIndexScanMulti {
            table,
            index,
            conjuncts,
        } => {
            let t = ctx.table(table)?;
            let gin = t
                .gin_index(index)
                .ok_or_else(|| SchemaError::UnknownColumn {
                    table: table.clone(),
                    column: index.clone(),
                })?;
            let conjuncts: Vec<_> = conjuncts
                .iter()
                .map(|(p, v)| (p.clone(), eval_lit(v)))
                .collect();
            let ids = gin.get_multi(&conjuncts);
            let rows = ids
                .into_iter()
                .filter_map(|id| t.get(id))
                .map(|r| r.values.clone())
                .collect::<Vec<_>>();
            Ok(Box::new(TableScan {
                rows: rows.into_iter(),
            }))
        }
        Plan::Filter { predicate, child } => {
            let child = build(child, ctx)?;
            Ok(Box::new(Filter {
                child,
                predicate: predicate.clone(),
            }))
        }
        Plan::Project { columns, child } => {
            let child = build(child, ctx)?;
            Ok(Box::new(Project {
                child,
                columns: columns.clone(),
            }))
        }
        Plan::Sort { keys, child } => {
            let mut rows = run(child, ctx)?;
            sort_rows(&mut rows, keys);
            Ok(Box::new(TableScan {
                rows: rows.into_iter(),
            }))
        }
        Plan::Limit { count, child } => {
            let child = build(child, ctx)?;
            Ok(Box::new(Limit {
                child,
                remaining: *count,
            }))
        }
        Plan::Offset { count, child } => {
            let child = build(child, ctx)?;
            Ok(Box::new(Offset {
                child,
                to_skip: *count,
            }))
        }
        Plan::TopK { k, keys, child } => {
            let rows = run(child, ctx)?;
            Ok(Box::new(TableScan {
                rows: top_k(rows, *k, keys).into_iter(),
            }))
        }
        Plan::Join {
            kind,
            on,
            left,
            right,
        } => {
            let left_rows = run(left, ctx)?;
            let right_rows = run(right, ctx)?;
            let right_arity = right_rows.first().map(Vec::len).unwrap_or(0);
            let mut build_side: HashMap<Value, Vec<&Tuple>> = HashMap::new();
            for row in &right_rows {
                build_side.entry(row[on.right_col].clone()).or_default().push(row);
            }
            let mut out = Vec::new();
            for l in left_rows {
                let key = l[on.left_col].clone();
                match build_side.get(&key) {
                    Some(matches) if !key.is_null() => {
                        for r in matches {
                            let mut combined = l.clone();
                            combined.extend((*r).clone());
                            out.push(combined);
                        }
                    }
                    _ => {
                        if *kind == JoinKind::Left {
                            let mut combined = l.clone();
                            combined.extend(std::iter::repeat(Value::Null).take(right_arity));
                            out.push(combined);
                        }
                    }
                }
            }
            Ok(Box::new(TableScan { rows: out.into_iter() }))
        }
        Plan::Aggregate { aggs, child } => {
            let rows = run(child, ctx)?;
            let out = aggs.iter().map(|a| compute_aggregate(&a.kind, &rows)).collect();
            Ok(Box::new(TableScan {
                rows: vec![out].into_iter(),
            }))
        }
        Plan::GroupBy { keys, aggs, child } => {
            let rows = run(child, ctx)?;
            let mut groups: Vec<(Vec<Value>, Vec<Tuple>)> = Vec::new();
            let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
            for row in rows {
                let key = compute_group_key(keys, &row);
                match index.get(&key) {
                    Some(&i) => groups[i].1.push(row),
                    None => {
                        index.insert(key.clone(), groups.len());
                        groups.push((key, vec![row]));
                    }
                }
            }
            let out = groups
                .into_iter()
                .map(|(key, group_rows)| {
                    let mut tuple = key;
                    tuple.extend(aggs.iter().map(|a| compute_aggregate(&a.kind, &group_rows)));
                    tuple
                })
                .collect::<Vec<_>>();
            Ok(Box::new(TableScan { rows: out.into_iter() }))
        }
    }
}

struct TableScan<I: Iterator<Item = Tuple>> {
    rows: I,
}

impl<I: Iterator<Item = Tuple>> Operator for TableScan<I> {
    fn next(&mut self) -> Option<Tuple> {
        self.rows.next()
    }
}

struct Filter<'a> {
    child: Box<dyn Operator + 'a>,
    predicate: Expr,
}

impl<'a> Operator for Filter<'a> {
    fn next(&mut self) -> Option<Tuple> {
        loop {
            let row = self.child.next()?;
            if self.predicate.eval(&row).is_true() {
                return Some(row);
            }
        }
    }
}

struct Project<'a> {
    child: Box<dyn Operator + 'a>,
    columns: Vec<usize>,
}

impl<'a> Operator for Project<'a> {
    fn next(&mut self) -> Option<Tuple> {
        let row = self.child.next()?;
        Some(self.columns.iter().map(|&i| row[i].clone()).collect())
    }
}

struct Limit<'a> {
    child: Box<dyn Operator + 'a>,
    remaining: usize,
}

impl<'a> Operator for Limit<'a> {
    fn next(&mut self) -> Option<Tuple> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.child.next()
    }
}

struct Offset<'a> {
    child: Box<dyn Operator + 'a>,
    to_skip: usize,
}

impl<'a> Operator for Offset<'a> {
    fn next(&mut self) -> Option<Tuple> {
        while self.to_skip > 0 {
            self.to_skip -= 1;
            self.child.next()?;
        }
        self.child.next()
    }
}

/// Total order over `Value` used for `Sort`/`TopK`: nulls sort last
/// ascending, first descending, consistently across runs (spec.md §4.4).
fn compare_for_sort(a: &Value, b: &Value, dir: SortDir) -> Ordering {
    let ord = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    };
    match dir {
        SortDir::Asc => ord,
        SortDir::Desc => {
            if a.is_null() || b.is_null() {
                // nulls-first under descending: flip only the non-null
                // ordering, keep the null placement rule above.
                match (a.is_null(), b.is_null()) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                }
            } else {
                ord.reverse()
            }
        }
    }
}

fn sort_rows(rows: &mut [Tuple], keys: &[(usize, SortDir)]) {
    rows.sort_by(|a, b| {
        for &(col, dir) in keys {
            let ord = compare_for_sort(&a[col], &b[col], dir);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// A row tagged with its multi-key sort order, ordered so `BinaryHeap`
/// (a max-heap) keeps the *largest* (worst-ranked) item on top — popping
/// it is exactly the eviction `TopK` wants once the heap exceeds `k`.
struct RankedRow {
    row: Tuple,
    keys: Vec<(usize, SortDir)>,
}

impl PartialEq for RankedRow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for RankedRow {}
impl PartialOrd for RankedRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RankedRow {
    fn cmp(&self, other: &Self) -> Ordering {
        for &(col, dir) in &self.keys {
            let ord = compare_for_sort(&self.row[col], &other.row[col], dir);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Bounded-heap top-k: keeps the `k` rows that sort first under `keys`,
/// emitted in sorted order at EOF (spec.md §4.3/§4.4).
fn top_k(rows: Vec<Tuple>, k: usize, keys: &[(usize, SortDir)]) -> Vec<Tuple> {
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<RankedRow> = BinaryHeap::with_capacity(k + 1);
    for row in rows {
        heap.push(RankedRow {
            row,
            keys: keys.to_vec(),
        });
        if heap.len() > k {
            heap.pop();
        }
    }
    let mut out: Vec<Tuple> = heap.into_sorted_vec().into_iter().map(|r| r.row).collect();
    out.truncate(k);
    out
}
