//! Plan optimizer (C7).
//!
//! Rewrites a logical [`Plan`] to fixed point over a whitelist of rules:
//! constant folding, predicate push-down through joins, index selection,
//! projection fusion, and limit/offset/sort fusion. Each rule is a pure
//! `Arc<Plan> -> Arc<Plan>` rewrite; the driver loop stops as soon as a
//! pass makes no change or `max_iterations` is hit, whichever comes first.

mod index_selection;

use crate::expr::Expr;
use crate::plan::Plan;
use crate::schema::Catalog;
use std::sync::Arc;

pub use index_selection::select_index_access;

pub struct Optimizer<'a> {
    catalog: &'a Catalog,
    max_iterations: usize,
}

impl<'a> Optimizer<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Optimizer {
            catalog,
            max_iterations: 10,
        }
    }

    pub fn with_max_iterations(catalog: &'a Catalog, max_iterations: usize) -> Self {
        Optimizer {
            catalog,
            max_iterations,
        }
    }

    pub fn optimize(&self, plan: Arc<Plan>) -> Arc<Plan> {
        let mut current = plan;
        for _ in 0..self.max_iterations {
            let next = self.pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// One bottom-up rewrite pass applying every rule at each node.
    fn pass(&self, plan: &Arc<Plan>) -> Arc<Plan> {
        let plan = self.rewrite_children(plan);
        let plan = self.fold_constants(&plan);
        let plan = self.pushdown_predicates(&plan);
        let plan = self.select_index(&plan);
        let plan = self.fuse_projections(&plan);
        let plan = self.fuse_sort_limit(&plan);
        self.push_limit_offset_through_project(&plan)
    }

    fn rewrite_children(&self, plan: &Arc<Plan>) -> Arc<Plan> {
        match &**plan {
            Plan::Filter { predicate, child } => Arc::new(Plan::Filter {
                predicate: predicate.clone(),
                child: self.pass(child),
            }),
            Plan::Project { columns, child } => Arc::new(Plan::Project {
                columns: columns.clone(),
                child: self.pass(child),
            }),
            Plan::Sort { keys, child } => Arc::new(Plan::Sort {
                keys: keys.clone(),
                child: self.pass(child),
            }),
            Plan::Limit { count, child } => Arc::new(Plan::Limit {
                count: *count,
                child: self.pass(child),
            }),
            Plan::Offset { count, child } => Arc::new(Plan::Offset {
                count: *count,
                child: self.pass(child),
            }),
            Plan::TopK { k, keys, child } => Arc::new(Plan::TopK {
                k: *k,
                keys: keys.clone(),
                child: self.pass(child),
            }),
            Plan::Join {
                kind,
                on,
                left,
                right,
            } => Arc::new(Plan::Join {
                kind: *kind,
                on: *on,
                left: self.pass(left),
                right: self.pass(right),
            }),
            Plan::Aggregate { aggs, child } => Arc::new(Plan::Aggregate {
                aggs: aggs.clone(),
                child: self.pass(child),
            }),
            Plan::GroupBy { keys, aggs, child } => Arc::new(Plan::GroupBy {
                keys: keys.clone(),
                aggs: aggs.clone(),
                child: self.pass(child),
            }),
            _ => plan.clone(),
        }
    }

    /// Rule 1: constant folding & boolean simplification.
    fn fold_constants(&self, plan: &Arc<Plan>) -> Arc<Plan> {
        match &**plan {
            Plan::Filter { predicate, child } => {
                let folded = simplify_expr(predicate);
                match &folded {
                    // `Filter(TRUE)` is the identity.
                    Expr::Lit(crate::value::Value::Bool(true)) => child.clone(),
                    _ => Arc::new(Plan::Filter {
                        predicate: folded,
                        child: child.clone(),
                    }),
                }
            }
            _ => plan.clone(),
        }
    }

    /// Rule 2: `Filter(Join(..))` splits conjuncts; each conjunct that
    /// references only one side is pushed into that side's subtree.
    fn pushdown_predicates(&self, plan: &Arc<Plan>) -> Arc<Plan> {
        let Plan::Filter { predicate, child } = &**plan else {
            return plan.clone();
        };
        let Plan::Join {
            kind,
            on,
            left,
            right,
        } = &**child
        else {
            return plan.clone();
        };
        let Some(left_arity) = self.plan_arity(left) else {
            return plan.clone();
        };

        let mut residual = Vec::new();
        let mut left_preds = Vec::new();
        let mut right_preds = Vec::new();
        for conjunct in predicate.conjuncts() {
            let mut cols = Vec::new();
            conjunct.referenced_columns(&mut cols);
            let max_col = cols.iter().copied().max();
            match max_col {
                Some(m) if m < left_arity => left_preds.push(conjunct.clone()),
                Some(_) if cols.iter().all(|&c| c >= left_arity) => {
                    right_preds.push(shift_columns(conjunct, -(left_arity as i64)))
                }
                _ => residual.push(conjunct.clone()),
            }
        }
        if left_preds.is_empty() && right_preds.is_empty() {
            return plan.clone();
        }

        let new_left = fold_and(left_preds)
            .map(|p| Arc::new(Plan::Filter { predicate: p, child: left.clone() }))
            .unwrap_or_else(|| left.clone());
        let new_right = fold_and(right_preds)
            .map(|p| Arc::new(Plan::Filter { predicate: p, child: right.clone() }))
            .unwrap_or_else(|| right.clone());
        let new_join = Arc::new(Plan::Join {
            kind: *kind,
            on: *on,
            left: new_left,
            right: new_right,
        });
        match fold_and(residual) {
            Some(p) => Arc::new(Plan::Filter {
                predicate: p,
                child: new_join,
            }),
            None => new_join,
        }
    }

    /// Rule 3: index selection over a `Filter(Scan(..))` fragment.
    fn select_index(&self, plan: &Arc<Plan>) -> Arc<Plan> {
        let Plan::Filter { predicate, child } = &**plan else {
            return plan.clone();
        };
        let Plan::Scan { table } = &**child else {
            return plan.clone();
        };
        let Ok(schema) = self.catalog.get(table) else {
            return plan.clone();
        };
        let conjuncts: Vec<Expr> = predicate.conjuncts().into_iter().cloned().collect();
        match select_index_access(table, &conjuncts, schema) {
            Some((access, residual)) => match fold_and(residual) {
                Some(p) => Arc::new(Plan::Filter {
                    predicate: p,
                    child: Arc::new(access),
                }),
                None => Arc::new(access),
            },
            None => plan.clone(),
        }
    }

    /// Rule 4 (partial): fuse consecutive `Project` nodes. True
    /// column-level pruning at the storage boundary is not applicable —
    /// the row store always yields full rows — so pruning here means
    /// collapsing a `Project` chain into the single composed projection
    /// the executor actually needs to apply.
    fn fuse_projections(&self, plan: &Arc<Plan>) -> Arc<Plan> {
        let Plan::Project { columns, child } = &**plan else {
            return plan.clone();
        };
        let Plan::Project {
            columns: inner_columns,
            child: inner_child,
        } = &**child
        else {
            return plan.clone();
        };
        let composed: Vec<usize> = columns.iter().map(|&i| inner_columns[i]).collect();
        Arc::new(Plan::Project {
            columns: composed,
            child: inner_child.clone(),
        })
    }

    /// Rule 5: `Limit(Sort(..))` ⇒ `TopK`.
    fn fuse_sort_limit(&self, plan: &Arc<Plan>) -> Arc<Plan> {
        let Plan::Limit { count, child } = &**plan else {
            return plan.clone();
        };
        let Plan::Sort { keys, child: sort_child } = &**child else {
            return plan.clone();
        };
        Arc::new(Plan::TopK {
            k: *count,
            keys: keys.clone(),
            child: sort_child.clone(),
        })
    }

    /// Rule 6: push `Limit`/`Offset` below a `Project` (row count and
    /// order are unaffected by a reshape).
    fn push_limit_offset_through_project(&self, plan: &Arc<Plan>) -> Arc<Plan> {
        match &**plan {
            Plan::Limit { count, child } => {
                if let Plan::Project { columns, child: inner } = &**child {
                    return Arc::new(Plan::Project {
                        columns: columns.clone(),
                        child: Arc::new(Plan::Limit {
                            count: *count,
                            child: inner.clone(),
                        }),
                    });
                }
                plan.clone()
            }
            Plan::Offset { count, child } => {
                if let Plan::Project { columns, child: inner } = &**child {
                    return Arc::new(Plan::Project {
                        columns: columns.clone(),
                        child: Arc::new(Plan::Offset {
                            count: *count,
                            child: inner.clone(),
                        }),
                    });
                }
                plan.clone()
            }
            _ => plan.clone(),
        }
    }

    /// Output arity of a plan subtree, used by predicate push-down to
    /// split a join filter's column indices at the left/right boundary.
    fn plan_arity(&self, plan: &Arc<Plan>) -> Option<usize> {
        match &**plan {
            Plan::Scan { table } => self.catalog.get(table).ok().map(|s| s.arity()),
            Plan::IndexGet { table, .. }
            | Plan::IndexScan { table, .. }
            | Plan::IndexMultiGet { table, .. }
            | Plan::GinIndexScan { table, .. }
            | Plan::GinIndexScanMulti { table, .. } => {
                self.catalog.get(table).ok().map(|s| s.arity())
            }
            Plan::Filter { child, .. }
            | Plan::Sort { child, .. }
            | Plan::Limit { child, .. }
            | Plan::Offset { child, .. }
            | Plan::TopK { child, .. } => self.plan_arity(child),
            Plan::Project { columns, .. } => Some(columns.len()),
            Plan::Join { left, right, .. } => {
                Some(self.plan_arity(left)? + self.plan_arity(right)?)
            }
            Plan::Aggregate { aggs, .. } => Some(aggs.len()),
            Plan::GroupBy { keys, aggs, .. } => Some(keys.len() + aggs.len()),
        }
    }
}

/// Recursively simplify an expression tree: `AND`/`OR` identities and
/// constant propagation through `NOT`. Does not attempt arithmetic
/// constant folding (the engine has no arithmetic expressions outside
/// aggregates, which the optimizer does not rewrite).
fn simplify_expr(e: &Expr) -> Expr {
    use crate::value::Value;
    match e {
        Expr::And(l, r) => {
            let l = simplify_expr(l);
            let r = simplify_expr(r);
            match (&l, &r) {
                (Expr::Lit(Value::Bool(true)), _) => r,
                (_, Expr::Lit(Value::Bool(true))) => l,
                (Expr::Lit(Value::Bool(false)), _) | (_, Expr::Lit(Value::Bool(false))) => {
                    Expr::Lit(Value::Bool(false))
                }
                _ => Expr::And(Box::new(l), Box::new(r)),
            }
        }
        Expr::Or(l, r) => {
            let l = simplify_expr(l);
            let r = simplify_expr(r);
            match (&l, &r) {
                (Expr::Lit(Value::Bool(false)), _) => r,
                (_, Expr::Lit(Value::Bool(false))) => l,
                (Expr::Lit(Value::Bool(true)), _) | (_, Expr::Lit(Value::Bool(true))) => {
                    Expr::Lit(Value::Bool(true))
                }
                _ => Expr::Or(Box::new(l), Box::new(r)),
            }
        }
        Expr::Not(inner) => {
            let inner = simplify_expr(inner);
            match inner {
                Expr::Lit(Value::Bool(b)) => Expr::Lit(Value::Bool(!b)),
                other => Expr::Not(Box::new(other)),
            }
        }
        other => other.clone(),
    }
}

fn fold_and(conjuncts: Vec<Expr>) -> Option<Expr> {
    let mut iter = conjuncts.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, next| acc.and(next)))
}

/// Shift every `Col(i)` reference in `expr` by `delta` (used to rebase a
/// join-side predicate's column indices onto that side's own schema).
fn shift_columns(expr: &Expr, delta: i64) -> Expr {
    match expr {
        Expr::Col(i) => Expr::Col((*i as i64 + delta).max(0) as usize),
        Expr::Lit(v) => Expr::Lit(v.clone()),
        Expr::Not(e) => Expr::Not(Box::new(shift_columns(e, delta))),
        Expr::And(l, r) => Expr::And(Box::new(shift_columns(l, delta)), Box::new(shift_columns(r, delta))),
        Expr::Or(l, r) => Expr::Or(Box::new(shift_columns(l, delta)), Box::new(shift_columns(r, delta))),
        Expr::Compare(op, l, r) => {
            Expr::Compare(*op, Box::new(shift_columns(l, delta)), Box::new(shift_columns(r, delta)))
        }
        Expr::Between(e, lo, hi) => Expr::Between(
            Box::new(shift_columns(e, delta)),
            Box::new(shift_columns(lo, delta)),
            Box::new(shift_columns(hi, delta)),
        ),
        Expr::In(e, list) => Expr::In(
            Box::new(shift_columns(e, delta)),
            list.iter().map(|x| shift_columns(x, delta)).collect(),
        ),
        Expr::Like(e, pattern) => Expr::Like(Box::new(shift_columns(e, delta)), pattern.clone()),
        Expr::IsNull(e) => Expr::IsNull(Box::new(shift_columns(e, delta))),
        Expr::IsNotNull(e) => Expr::IsNotNull(Box::new(shift_columns(e, delta))),
        Expr::JsonPath(e, path) => Expr::JsonPath(Box::new(shift_columns(e, delta)), path.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlanBuilder, SortDir};
    use crate::schema::{Catalog, ColumnDef, IndexDef, TableSchema};
    use crate::value::{DataType, Value};

    fn catalog_with_items() -> Catalog {
        let mut cat = Catalog::new();
        cat.create_table(
            TableSchema::new(
                "items",
                vec![
                    ColumnDef::new("id", DataType::Int64, false),
                    ColumnDef::new("price", DataType::Int64, false),
                ],
                "id",
                vec![IndexDef::ordered("items_price_idx", "price")],
            )
            .unwrap(),
        )
        .unwrap();
        cat
    }

    #[test]
    fn constant_true_filter_is_eliminated() {
        let cat = catalog_with_items();
        let opt = Optimizer::new(&cat);
        let plan = PlanBuilder::scan("items")
            .filter(Expr::lit(Value::Bool(true)))
            .build();
        let optimized = opt.optimize(plan);
        assert!(matches!(&*optimized, Plan::Scan { .. }));
    }

    #[test]
    fn pk_equality_selects_index_get() {
        let cat = catalog_with_items();
        let opt = Optimizer::new(&cat);
        let plan = PlanBuilder::scan("items")
            .filter(Expr::col(0).eq(Expr::lit(5i64)))
            .build();
        let optimized = opt.optimize(plan);
        assert!(matches!(&*optimized, Plan::IndexGet { .. }));
    }

    #[test]
    fn sort_then_limit_fuses_into_topk() {
        let cat = catalog_with_items();
        let opt = Optimizer::new(&cat);
        let plan = PlanBuilder::scan("items")
            .sort(vec![(1, SortDir::Asc)])
            .limit(5)
            .build();
        let optimized = opt.optimize(plan);
        assert!(matches!(&*optimized, Plan::TopK { k: 5, .. }));
    }

    #[test]
    fn limit_pushes_below_project() {
        let cat = catalog_with_items();
        let opt = Optimizer::new(&cat);
        let plan = PlanBuilder::scan("items").project(vec![0]).limit(5).build();
        let optimized = opt.optimize(plan);
        assert!(matches!(&*optimized, Plan::Project { .. }));
        if let Plan::Project { child, .. } = &*optimized {
            assert!(matches!(&**child, Plan::Limit { .. }));
        }
    }

    #[test]
    fn consecutive_projects_fuse() {
        let cat = catalog_with_items();
        let opt = Optimizer::new(&cat);
        let plan = PlanBuilder::scan("items")
            .project(vec![0, 1])
            .project(vec![1])
            .build();
        let optimized = opt.optimize(plan);
        assert!(matches!(&*optimized, Plan::Project { columns, .. } if columns == &vec![1]));
    }
}
