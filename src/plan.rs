//! Logical plan algebra and fluent builder (C6).
//!
//! A plan is an immutable tree built once via [`PlanBuilder`]; the
//! optimizer (C7) only ever produces new trees by structural rewrite.
//! There is no textual query language — callers build plans directly
//! through the builder's method chain.

use crate::expr::Expr;
use crate::value::JsonPath;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggKind {
    Count,
    CountCol(usize),
    Sum(usize),
    Avg(usize),
    Min(usize),
    Max(usize),
    Stddev(usize),
    Geomean(usize),
    Distinct(usize),
}

/// One aggregate computation within an `Aggregate`/`GroupBy` node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggSpec {
    pub kind: AggKind,
    pub output_name: String,
}

impl AggSpec {
    pub fn new(kind: AggKind, output_name: impl Into<String>) -> Self {
        AggSpec {
            kind,
            output_name: output_name.into(),
        }
    }
}

/// A join-key pair: column index on the left side, column index on the
/// right side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOn {
    pub left_col: usize,
    pub right_col: usize,
}

/// A logical plan node. Children are `Arc`-shared so the optimizer can
/// reuse unmodified subtrees across rewrite passes without cloning them.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Scan {
        table: String,
    },
    /// Primary-key or unique-index point lookup, chosen by the optimizer
    /// in place of a `Scan+Filter` fragment. `index` is `None` for the
    /// implicit primary-key index, `Some(name)` for a declared unique
    /// index.
    IndexGet {
        table: String,
        index: Option<String>,
        key: Expr,
    },
    /// Ordered-index range/point scan. `lo`/`hi` of `None` means
    /// unbounded on that side.
    IndexScan {
        table: String,
        index: String,
        lo: Option<Expr>,
        lo_inclusive: bool,
        hi: Option<Expr>,
        hi_inclusive: bool,
    },
    /// `IN (list)` over an ordered index.
    IndexMultiGet {
        table: String,
        index: String,
        keys: Vec<Expr>,
    },
    /// Single-path GIN equality lookup.
    GinIndexScan {
        table: String,
        index: String,
        path: JsonPath,
        value: Expr,
    },
    /// Intersection of postings for several path-equality conjuncts on the
    /// same GIN-indexed column.
    GinIndexScanMulti {
        table: String,
        index: String,
        conjuncts: Vec<(JsonPath, Expr)>,
    },
    Filter {
        predicate: Expr,
        child: Arc<Plan>,
    },
    Project {
        columns: Vec<usize>,
        child: Arc<Plan>,
    },
    Sort {
        keys: Vec<(usize, SortDir)>,
        child: Arc<Plan>,
    },
    Limit {
        count: usize,
        child: Arc<Plan>,
    },
    Offset {
        count: usize,
        child: Arc<Plan>,
    },
    TopK {
        k: usize,
        keys: Vec<(usize, SortDir)>,
        child: Arc<Plan>,
    },
    Join {
        kind: JoinKind,
        on: JoinOn,
        left: Arc<Plan>,
        right: Arc<Plan>,
    },
    Aggregate {
        aggs: Vec<AggSpec>,
        child: Arc<Plan>,
    },
    GroupBy {
        keys: Vec<usize>,
        aggs: Vec<AggSpec>,
        child: Arc<Plan>,
    },
}

impl Plan {
    pub fn children(&self) -> Vec<&Arc<Plan>> {
        match self {
            Plan::Scan { .. }
            | Plan::IndexGet { .. }
            | Plan::IndexScan { .. }
            | Plan::IndexMultiGet { .. }
            | Plan::GinIndexScan { .. }
            | Plan::GinIndexScanMulti { .. } => vec![],
            Plan::Filter { child, .. }
            | Plan::Project { child, .. }
            | Plan::Sort { child, .. }
            | Plan::Limit { child, .. }
            | Plan::Offset { child, .. }
            | Plan::TopK { child, .. }
            | Plan::Aggregate { child, .. }
            | Plan::GroupBy { child, .. } => vec![child],
            Plan::Join { left, right, .. } => vec![left, right],
        }
    }

    /// Tables referenced anywhere in the tree, used by the re-execution
    /// observer's coarse change-detection and by the IVM tracer.
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_tables(&mut out);
        out
    }

    fn collect_tables(&self, out: &mut Vec<String>) {
        let table = match self {
            Plan::Scan { table }
            | Plan::IndexGet { table, .. }
            | Plan::IndexScan { table, .. }
            | Plan::IndexMultiGet { table, .. }
            | Plan::GinIndexScan { table, .. }
            | Plan::GinIndexScanMulti { table, .. } => Some(table),
            _ => None,
        };
        if let Some(table) = table {
            if !out.contains(table) {
                out.push(table.clone());
            }
        }
        for child in self.children() {
            child.collect_tables(out);
        }
    }
}

/// Fluent builder over [`Plan`]. Each method consumes `self` and returns a
/// new builder wrapping the extended tree — the builder itself carries no
/// schema information; column references are positional indices resolved
/// by the caller against the table/child schema.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: Arc<Plan>,
}

impl PlanBuilder {
    pub fn scan(table: impl Into<String>) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::Scan { table: table.into() }),
        }
    }

    pub fn filter(self, predicate: Expr) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::Filter {
                predicate,
                child: self.plan,
            }),
        }
    }

    pub fn project(self, columns: Vec<usize>) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::Project {
                columns,
                child: self.plan,
            }),
        }
    }

    pub fn sort(self, keys: Vec<(usize, SortDir)>) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::Sort {
                keys,
                child: self.plan,
            }),
        }
    }

    pub fn limit(self, count: usize) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::Limit {
                count,
                child: self.plan,
            }),
        }
    }

    pub fn offset(self, count: usize) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::Offset {
                count,
                child: self.plan,
            }),
        }
    }

    pub fn join(self, kind: JoinKind, on: JoinOn, right: PlanBuilder) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::Join {
                kind,
                on,
                left: self.plan,
                right: right.plan,
            }),
        }
    }

    pub fn aggregate(self, aggs: Vec<AggSpec>) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::Aggregate {
                aggs,
                child: self.plan,
            }),
        }
    }

    pub fn group_by(self, keys: Vec<usize>, aggs: Vec<AggSpec>) -> Self {
        PlanBuilder {
            plan: Arc::new(Plan::GroupBy {
                keys,
                aggs,
                child: self.plan,
            }),
        }
    }

    pub fn build(self) -> Arc<Plan> {
        self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    #[test]
    fn builder_produces_expected_tree_shape() {
        let plan = PlanBuilder::scan("items")
            .filter(Expr::col(0).gt(Expr::lit(5i64)))
            .project(vec![0, 1])
            .sort(vec![(1, SortDir::Asc)])
            .limit(10)
            .build();
        assert!(matches!(&*plan, Plan::Limit { count: 10, .. }));
    }

    #[test]
    fn referenced_tables_covers_both_join_sides() {
        let left = PlanBuilder::scan("orders");
        let right = PlanBuilder::scan("customers");
        let plan = left
            .join(
                JoinKind::Inner,
                JoinOn {
                    left_col: 1,
                    right_col: 0,
                },
                right,
            )
            .build();
        let mut tables = plan.referenced_tables();
        tables.sort();
        assert_eq!(tables, vec!["customers".to_string(), "orders".to_string()]);
    }

    #[test]
    fn referenced_tables_dedups_self_join() {
        let left = PlanBuilder::scan("items");
        let right = PlanBuilder::scan("items");
        let plan = left
            .join(
                JoinKind::Inner,
                JoinOn {
                    left_col: 0,
                    right_col: 0,
                },
                right,
            )
            .build();
        assert_eq!(plan.referenced_tables(), vec!["items".to_string()]);
    }
}
