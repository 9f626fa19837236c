//! Expression tree and three-valued evaluator (C5).
//!
//! Expressions are built once and treated as immutable thereafter; the
//! optimizer only ever produces new trees by structural rewrite, never by
//! mutating a node in place (spec.md §9: "expression trees are immutable
//! after build").

use crate::value::{JsonPath, Trilean, Value};
use std::cmp::Ordering;

/// A row view an expression is evaluated against: column values addressed
/// by position, matching the schema the expression was built against.
pub trait RowView {
    fn column(&self, index: usize) -> &Value;
}

impl RowView for [Value] {
    fn column(&self, index: usize) -> &Value {
        &self[index]
    }
}

impl RowView for Vec<Value> {
    fn column(&self, index: usize) -> &Value {
        self.as_slice().column(index)
    }
}

impl RowView for crate::value::Row {
    fn column(&self, index: usize) -> &Value {
        self.get(index).expect("column index in range")
    }
}

/// Comparison operator tag shared by [`Expr::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Col(usize),
    Lit(Value),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Between(Box<Expr>, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Vec<Expr>),
    Like(Box<Expr>, String),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    JsonPath(Box<Expr>, JsonPath),
}

impl Expr {
    pub fn col(index: usize) -> Expr {
        Expr::Col(index)
    }
    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Lit(value.into())
    }
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }
    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
    pub fn eq(self, rhs: Expr) -> Expr {
        Expr::Compare(CompareOp::Eq, Box::new(self), Box::new(rhs))
    }
    pub fn ne(self, rhs: Expr) -> Expr {
        Expr::Compare(CompareOp::Ne, Box::new(self), Box::new(rhs))
    }
    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::Compare(CompareOp::Lt, Box::new(self), Box::new(rhs))
    }
    pub fn lte(self, rhs: Expr) -> Expr {
        Expr::Compare(CompareOp::Lte, Box::new(self), Box::new(rhs))
    }
    pub fn gt(self, rhs: Expr) -> Expr {
        Expr::Compare(CompareOp::Gt, Box::new(self), Box::new(rhs))
    }
    pub fn gte(self, rhs: Expr) -> Expr {
        Expr::Compare(CompareOp::Gte, Box::new(self), Box::new(rhs))
    }
    pub fn between(self, lo: Expr, hi: Expr) -> Expr {
        Expr::Between(Box::new(self), Box::new(lo), Box::new(hi))
    }
    pub fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In(Box::new(self), values)
    }
    pub fn like(self, pattern: impl Into<String>) -> Expr {
        Expr::Like(Box::new(self), pattern.into())
    }
    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }
    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }
    pub fn json_path(self, path: JsonPath) -> Expr {
        Expr::JsonPath(Box::new(self), path)
    }

    /// Evaluate against a row view, producing a three-valued result.
    pub fn eval(&self, row: &dyn RowView) -> Trilean {
        match self.eval_value(row) {
            Value::Bool(b) => Trilean::from(b),
            Value::Null => Trilean::Unknown,
            // Non-boolean results (e.g. evaluating a bare Col/Lit at the
            // top level) have no truth value.
            _ => Trilean::Unknown,
        }
    }

    /// Evaluate to a scalar `Value`. Boolean-producing nodes return
    /// `Value::Bool`/`Value::Null`; the rest resolve a scalar.
    pub fn eval_value(&self, row: &dyn RowView) -> Value {
        match self {
            Expr::Col(i) => row.column(*i).clone(),
            Expr::Lit(v) => v.clone(),
            Expr::Not(e) => trilean_to_value(!e.eval(row)),
            Expr::And(l, r) => trilean_to_value(l.eval(row) & r.eval(row)),
            Expr::Or(l, r) => trilean_to_value(l.eval(row) | r.eval(row)),
            Expr::Compare(op, l, r) => {
                let lv = l.eval_value(row);
                let rv = r.eval_value(row);
                trilean_to_value(eval_compare(*op, &lv, &rv))
            }
            Expr::Between(e, lo, hi) => {
                let v = e.eval_value(row);
                let lo = lo.eval_value(row);
                let hi = hi.eval_value(row);
                let ge_lo = eval_compare(CompareOp::Gte, &v, &lo);
                let le_hi = eval_compare(CompareOp::Lte, &v, &hi);
                trilean_to_value(ge_lo & le_hi)
            }
            Expr::In(e, list) => {
                let v = e.eval_value(row);
                if v.is_null() {
                    return Value::Null;
                }
                let mut any_unknown = false;
                for item in list {
                    let iv = item.eval_value(row);
                    match v.eq3(&iv) {
                        Trilean::True => return Value::Bool(true),
                        Trilean::Unknown => any_unknown = true,
                        Trilean::False => {}
                    }
                }
                if any_unknown {
                    Value::Null
                } else {
                    Value::Bool(false)
                }
            }
            Expr::Like(e, pattern) => {
                let v = e.eval_value(row);
                match v {
                    Value::Null => Value::Null,
                    Value::String(s) => Value::Bool(like_match(&s, pattern)),
                    _ => Value::Bool(false),
                }
            }
            Expr::IsNull(e) => Value::Bool(e.eval_value(row).is_null()),
            Expr::IsNotNull(e) => Value::Bool(!e.eval_value(row).is_null()),
            Expr::JsonPath(e, path) => {
                let v = e.eval_value(row);
                match v {
                    Value::Jsonb(tree) => {
                        crate::value::json_leaf_at_path(&tree, path).unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                }
            }
        }
    }

    /// Columns this expression reads, used by predicate push-down and
    /// projection pruning.
    pub fn referenced_columns(&self, out: &mut Vec<usize>) {
        match self {
            Expr::Col(i) => out.push(*i),
            Expr::Lit(_) => {}
            Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) | Expr::JsonPath(e, _) => {
                e.referenced_columns(out)
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.referenced_columns(out);
                r.referenced_columns(out);
            }
            Expr::Compare(_, l, r) => {
                l.referenced_columns(out);
                r.referenced_columns(out);
            }
            Expr::Between(e, lo, hi) => {
                e.referenced_columns(out);
                lo.referenced_columns(out);
                hi.referenced_columns(out);
            }
            Expr::In(e, list) => {
                e.referenced_columns(out);
                for item in list {
                    item.referenced_columns(out);
                }
            }
            Expr::Like(e, _) => e.referenced_columns(out),
        }
    }

    /// Split a top-level conjunction into its conjuncts (used by predicate
    /// push-down and the optimizer's `AND` flattening).
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(l, r) => {
                let mut v = l.conjuncts();
                v.extend(r.conjuncts());
                v
            }
            other => vec![other],
        }
    }
}

fn trilean_to_value(t: Trilean) -> Value {
    match t {
        Trilean::True => Value::Bool(true),
        Trilean::False => Value::Bool(false),
        Trilean::Unknown => Value::Null,
    }
}

/// `eq(null)` is always `Unknown`, never a match — the open question in
/// spec.md §9 resolved in favor of `IsNull` being the only way to match
/// nulls.
fn eval_compare(op: CompareOp, l: &Value, r: &Value) -> Trilean {
    match op {
        CompareOp::Eq => l.eq3(r),
        CompareOp::Ne => !l.eq3(r),
        CompareOp::Lt => l
            .cmp3(r)
            .map(|o| Trilean::from(o == Ordering::Less))
            .unwrap_or(Trilean::Unknown),
        CompareOp::Lte => l
            .cmp3(r)
            .map(|o| Trilean::from(o != Ordering::Greater))
            .unwrap_or(Trilean::Unknown),
        CompareOp::Gt => l
            .cmp3(r)
            .map(|o| Trilean::from(o == Ordering::Greater))
            .unwrap_or(Trilean::Unknown),
        CompareOp::Gte => l
            .cmp3(r)
            .map(|o| Trilean::from(o != Ordering::Less))
            .unwrap_or(Trilean::Unknown),
    }
}

/// A small `LIKE` matcher: `%` = any run of characters, `_` = any single
/// character. No escaping support (not required by spec.md).
fn like_match(text: &str, pattern: &str) -> bool {
    fn rec(t: &[char], p: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('%') => rec(t, &p[1..]) || (!t.is_empty() && rec(&t[1..], p)),
            Some('_') => !t.is_empty() && rec(&t[1..], &p[1..]),
            Some(c) => t.first() == Some(c) && rec(&t[1..], &p[1..]),
        }
    }
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    rec(&t, &p)
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Value>) -> Vec<Value> {
        values
    }

    #[test]
    fn three_valued_filter_on_nullable_column() {
        // v in {10, null, 20}
        let rows = vec![row(vec![Value::Int64(10)]), row(vec![Value::Null]), row(vec![Value::Int64(20)])];
        let gt5 = Expr::col(0).gt(Expr::lit(5i64));
        let matched: Vec<_> = rows.iter().filter(|r| gt5.eval(*r).is_true()).collect();
        assert_eq!(matched.len(), 2);

        let lt100 = Expr::col(0).lt(Expr::lit(100i64));
        let matched: Vec<_> = rows.iter().filter(|r| lt100.eval(*r).is_true()).collect();
        assert_eq!(matched.len(), 2);

        let in_list = Expr::col(0).in_list(vec![Expr::lit(10i64), Expr::lit(20i64)]);
        let matched: Vec<_> = rows.iter().filter(|r| in_list.eval(*r).is_true()).collect();
        assert_eq!(matched.len(), 2);

        let between = Expr::col(0).between(Expr::lit(1i64), Expr::lit(20i64));
        let matched: Vec<_> = rows.iter().filter(|r| between.eval(*r).is_true()).collect();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn eq_null_never_matches() {
        let e = Expr::col(0).eq(Expr::lit(Value::Null));
        assert!(!e.eval(&vec![Value::Int64(1)]).is_true());
        assert!(!e.eval(&vec![Value::Null]).is_true());
    }

    #[test]
    fn is_null_is_the_only_way_to_match_null() {
        let e = Expr::col(0).is_null();
        assert!(e.eval(&vec![Value::Null]).is_true());
        assert!(!e.eval(&vec![Value::Int64(1)]).is_true());
    }

    #[test]
    fn in_list_never_matches_null() {
        let e = Expr::col(0).in_list(vec![Expr::lit(1i64), Expr::lit(2i64)]);
        assert!(!e.eval(&vec![Value::Null]).is_true());
    }

    #[test]
    fn like_matches_wildcards() {
        assert!(like_match("hello", "h%o"));
        assert!(like_match("hello", "h_ll_"));
        assert!(!like_match("hello", "world"));
    }

    #[test]
    fn referenced_columns_collects_all_leaves() {
        let e = Expr::col(0).gt(Expr::lit(1i64)).and(Expr::col(1).eq(Expr::lit("x")));
        let mut cols = Vec::new();
        e.referenced_columns(&mut cols);
        assert_eq!(cols, vec![0, 1]);
    }

    #[test]
    fn conjuncts_splits_and_chain() {
        let e = Expr::col(0)
            .gt(Expr::lit(1i64))
            .and(Expr::col(1).eq(Expr::lit("x")))
            .and(Expr::col(2).is_null());
        assert_eq!(e.conjuncts().len(), 3);
    }
}
