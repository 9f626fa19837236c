//! Index-selection rule (C7 rule 3).
//!
//! Given the conjuncts of a `Filter` directly above a `Scan`, picks at
//! most one access path and returns the residual conjuncts that still
//! need to be checked by a `Filter` above it.

use crate::expr::{CompareOp, Expr};
use crate::plan::Plan;
use crate::schema::{IndexKind, TableSchema};
use crate::value::{JsonPath, Value};

/// What a single conjunct says about one column, if anything.
enum ColumnPredicate {
    Eq(Value),
    Range {
        lo: Option<Value>,
        lo_inclusive: bool,
        hi: Option<Value>,
        hi_inclusive: bool,
    },
    In(Vec<Value>),
}

/// What a single conjunct says about one GIN path, if anything.
struct GinPredicate {
    column: usize,
    path: JsonPath,
    value: Value,
}

fn as_literal(e: &Expr) -> Option<&Value> {
    match e {
        Expr::Lit(v) => Some(v),
        _ => None,
    }
}

/// Match `Col(i) op Lit` or `Lit op Col(i)`, normalizing to `(i, op, lit)`
/// with `op` rewritten as if the column were always on the left.
fn as_column_compare<'e>(op: CompareOp, l: &'e Expr, r: &'e Expr) -> Option<(usize, CompareOp, &'e Value)> {
    if let (Expr::Col(i), Some(lit)) = (l, as_literal(r)) {
        return Some((*i, op, lit));
    }
    if let (Some(lit), Expr::Col(i)) = (as_literal(l), r) {
        let flipped = match op {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Lte => CompareOp::Gte,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Gte => CompareOp::Lte,
            same => same,
        };
        return Some((*i, flipped, lit));
    }
    None
}

fn classify_column_predicate(e: &Expr) -> Option<(usize, ColumnPredicate)> {
    match e {
        Expr::Compare(op, l, r) => {
            let (col, op, lit) = as_column_compare(*op, l, r)?;
            let pred = match op {
                CompareOp::Eq => ColumnPredicate::Eq(lit.clone()),
                CompareOp::Lt => ColumnPredicate::Range {
                    lo: None,
                    lo_inclusive: false,
                    hi: Some(lit.clone()),
                    hi_inclusive: false,
                },
                CompareOp::Lte => ColumnPredicate::Range {
                    lo: None,
                    lo_inclusive: false,
                    hi: Some(lit.clone()),
                    hi_inclusive: true,
                },
                CompareOp::Gt => ColumnPredicate::Range {
                    lo: Some(lit.clone()),
                    lo_inclusive: false,
                    hi: None,
                    hi_inclusive: false,
                },
                CompareOp::Gte => ColumnPredicate::Range {
                    lo: Some(lit.clone()),
                    lo_inclusive: true,
                    hi: None,
                    hi_inclusive: false,
                },
                CompareOp::Ne => return None,
            };
            Some((col, pred))
        }
        Expr::Between(e, lo, hi) => {
            let Expr::Col(i) = &**e else { return None };
            let lo = as_literal(lo)?.clone();
            let hi = as_literal(hi)?.clone();
            Some((
                *i,
                ColumnPredicate::Range {
                    lo: Some(lo),
                    lo_inclusive: true,
                    hi: Some(hi),
                    hi_inclusive: true,
                },
            ))
        }
        Expr::In(e, list) => {
            let Expr::Col(i) = &**e else { return None };
            let values: Option<Vec<Value>> = list.iter().map(as_literal).map(|v| v.cloned()).collect();
            Some((*i, ColumnPredicate::In(values?)))
        }
        _ => None,
    }
}

fn classify_gin_predicate(e: &Expr) -> Option<GinPredicate> {
    let Expr::Compare(CompareOp::Eq, l, r) = e else {
        return None;
    };
    let (json_expr, lit) = match (l.as_ref(), as_literal(r)) {
        (Expr::JsonPath(inner, path), Some(v)) => (Some((inner, path)), Some(v)),
        _ => (None, None),
    };
    let (json_expr, lit) = if json_expr.is_some() {
        (json_expr, lit)
    } else if let (Expr::JsonPath(inner, path), Some(v)) = (r.as_ref(), as_literal(l)) {
        (Some((inner, path)), Some(v))
    } else {
        (None, None)
    };
    let (inner, path) = json_expr?;
    let Expr::Col(column) = inner.as_ref() else {
        return None;
    };
    Some(GinPredicate {
        column: *column,
        path: path.clone(),
        value: lit?.clone(),
    })
}

/// Select at most one access path over `table`'s conjuncts, returning the
/// physical plan node and the conjuncts still requiring a residual filter.
pub fn select_index_access(
    table: &str,
    conjuncts: &[Expr],
    schema: &TableSchema,
) -> Option<(Plan, Vec<Expr>)> {
    let pk_col = schema.primary_key_index();

    // Primary-key equality is always the best available access path.
    for (i, c) in conjuncts.iter().enumerate() {
        if let Some((col, ColumnPredicate::Eq(value))) = classify_column_predicate(c) {
            if col == pk_col {
                let mut residual: Vec<Expr> = conjuncts.to_vec();
                residual.remove(i);
                return Some((
                    Plan::IndexGet {
                        table: table.to_string(),
                        index: None,
                        key: Expr::lit(value),
                    },
                    residual,
                ));
            }
        }
    }

    // GIN paths: collect all path-equality predicates per GIN-indexed
    // column, preferring a multi-path intersection over a single lookup.
    for index in schema.indexes.iter().filter(|i| i.kind == IndexKind::Gin) {
        let Some(col) = schema.column_index(&index.column) else {
            continue;
        };
        let mut matches = Vec::new();
        for (i, c) in conjuncts.iter().enumerate() {
            if let Some(gp) = classify_gin_predicate(c) {
                if gp.column == col {
                    matches.push((i, gp));
                }
            }
        }
        if matches.is_empty() {
            continue;
        }
        let used: Vec<usize> = matches.iter().map(|(i, _)| *i).collect();
        let residual: Vec<Expr> = conjuncts
            .iter()
            .enumerate()
            .filter(|(i, _)| !used.contains(i))
            .map(|(_, c)| c.clone())
            .collect();
        if matches.len() >= 2 {
            let conjuncts = matches
                .into_iter()
                .map(|(_, gp)| (gp.path, Expr::lit(gp.value)))
                .collect();
            return Some((
                Plan::GinIndexScanMulti {
                    table: table.to_string(),
                    index: index.name.clone(),
                    conjuncts,
                },
                residual,
            ));
        }
        let (_, gp) = matches.into_iter().next().unwrap();
        return Some((
            Plan::GinIndexScan {
                table: table.to_string(),
                index: index.name.clone(),
                path: gp.path,
                value: Expr::lit(gp.value),
            },
            residual,
        ));
    }

    // Unique, then ordered indexes: equality beats range beats `IN`.
    let ranked_kinds = [IndexKind::Unique, IndexKind::Ordered];
    for kind in ranked_kinds {
        for index in schema.indexes.iter().filter(|i| i.kind == kind) {
            let Some(col) = schema.column_index(&index.column) else {
                continue;
            };
            for (i, c) in conjuncts.iter().enumerate() {
                let Some((pred_col, pred)) = classify_column_predicate(c) else {
                    continue;
                };
                if pred_col != col {
                    continue;
                }
                let mut residual: Vec<Expr> = conjuncts.to_vec();
                residual.remove(i);
                let access = match pred {
                    ColumnPredicate::Eq(value) if kind == IndexKind::Unique => Plan::IndexGet {
                        table: table.to_string(),
                        index: Some(index.name.clone()),
                        key: Expr::lit(value),
                    },
                    ColumnPredicate::Eq(value) => Plan::IndexScan {
                        table: table.to_string(),
                        index: index.name.clone(),
                        lo: Some(Expr::lit(value.clone())),
                        lo_inclusive: true,
                        hi: Some(Expr::lit(value)),
                        hi_inclusive: true,
                    },
                    ColumnPredicate::Range {
                        lo,
                        lo_inclusive,
                        hi,
                        hi_inclusive,
                    } => Plan::IndexScan {
                        table: table.to_string(),
                        index: index.name.clone(),
                        lo: lo.map(Expr::lit),
                        lo_inclusive,
                        hi: hi.map(Expr::lit),
                        hi_inclusive,
                    },
                    ColumnPredicate::In(values) => Plan::IndexMultiGet {
                        table: table.to_string(),
                        index: index.name.clone(),
                        keys: values.into_iter().map(Expr::lit).collect(),
                    },
                };
                return Some((access, residual));
            }
        }
    }

    None
}
