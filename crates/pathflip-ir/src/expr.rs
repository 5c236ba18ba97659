//! Integer-valued symbolic expressions.
//!
//! Two shapes are supported:
//! - [`LinearExpr`]: a sparse `Σ coeff·var + constant`, the form the
//!   instrumentation produces for ordinary integer arithmetic.
//! - [`ScalarExpr`]: an arbitrary expression tree, for comparisons whose
//!   operands are not in linear-sum form (products of two symbols, etc.).
//!
//! All arithmetic wraps on overflow, mirroring the 64-bit semantics of the
//! program under test.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::solution::{SolutionMap, SymVar};

/// Comparison of an expression against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
}

impl CompareOp {
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
        }
    }

    /// Does `value <op> 0` hold?
    pub fn holds(self, value: i64) -> bool {
        match self {
            CompareOp::Eq => value == 0,
            CompareOp::Ne => value != 0,
            CompareOp::Le => value <= 0,
            CompareOp::Lt => value < 0,
            CompareOp::Ge => value >= 0,
            CompareOp::Gt => value > 0,
        }
    }

    /// Operator token in the solver's presentation language.
    pub fn token(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "/=",
            CompareOp::Le => "<=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
        }
    }
}

// ── Linear sums ──────────────────────────────────────────────────────

/// Sparse linear sum. Zero coefficients are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinearExpr {
    pub coefficients: BTreeMap<SymVar, i64>,
    pub constant: i64,
}

impl LinearExpr {
    pub fn constant(value: i64) -> Self {
        Self {
            coefficients: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn var(var: SymVar) -> Self {
        Self::term(var, 1)
    }

    pub fn term(var: SymVar, coefficient: i64) -> Self {
        let mut expr = Self::default();
        expr.add_term(var, coefficient);
        expr
    }

    fn add_term(&mut self, var: SymVar, coefficient: i64) {
        let entry = self.coefficients.entry(var).or_insert(0);
        *entry = entry.wrapping_add(coefficient);
        if *entry == 0 {
            self.coefficients.remove(&var);
        }
    }

    pub fn plus(&self, other: &LinearExpr) -> LinearExpr {
        let mut out = self.clone();
        for (var, coefficient) in &other.coefficients {
            out.add_term(*var, *coefficient);
        }
        out.constant = out.constant.wrapping_add(other.constant);
        out
    }

    pub fn minus(&self, other: &LinearExpr) -> LinearExpr {
        self.plus(&other.scaled(-1))
    }

    pub fn plus_constant(&self, value: i64) -> LinearExpr {
        let mut out = self.clone();
        out.constant = out.constant.wrapping_add(value);
        out
    }

    pub fn scaled(&self, factor: i64) -> LinearExpr {
        if factor == 0 {
            return LinearExpr::constant(0);
        }
        LinearExpr {
            coefficients: self
                .coefficients
                .iter()
                .map(|(v, c)| (*v, c.wrapping_mul(factor)))
                .collect(),
            constant: self.constant.wrapping_mul(factor),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn vars(&self) -> impl Iterator<Item = SymVar> + '_ {
        self.coefficients.keys().copied()
    }

    /// Replace every variable bound in `soln` by its value.
    pub fn substitute(&self, soln: &SolutionMap) -> LinearExpr {
        let mut out = LinearExpr::constant(self.constant);
        for (var, coefficient) in &self.coefficients {
            match soln.get(*var) {
                Some(value) => {
                    out.constant = out.constant.wrapping_add(coefficient.wrapping_mul(value))
                }
                None => out.add_term(*var, *coefficient),
            }
        }
        out
    }

    /// Concrete value under `soln`, if every variable is bound.
    pub fn evaluate(&self, soln: &SolutionMap) -> Option<i64> {
        let folded = self.substitute(soln);
        folded.is_constant().then_some(folded.constant)
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.coefficients.is_empty() {
            return write!(f, "({})", self.constant);
        }
        let mut first = true;
        for (var, coefficient) in &self.coefficients {
            if !first {
                write!(f, " + ")?;
            }
            first = false;
            write!(f, "{var}*({coefficient})")?;
        }
        if self.constant != 0 {
            write!(f, "+({})", self.constant)?;
        }
        Ok(())
    }
}

// ── General scalar trees ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarExpr {
    Const(i64),
    Var(SymVar),
    Add(Box<ScalarExpr>, Box<ScalarExpr>),
    Sub(Box<ScalarExpr>, Box<ScalarExpr>),
    Mul(Box<ScalarExpr>, Box<ScalarExpr>),
}

impl ScalarExpr {
    pub fn add(lhs: ScalarExpr, rhs: ScalarExpr) -> Self {
        ScalarExpr::Add(Box::new(lhs), Box::new(rhs))
    }

    pub fn sub(lhs: ScalarExpr, rhs: ScalarExpr) -> Self {
        ScalarExpr::Sub(Box::new(lhs), Box::new(rhs))
    }

    pub fn mul(lhs: ScalarExpr, rhs: ScalarExpr) -> Self {
        ScalarExpr::Mul(Box::new(lhs), Box::new(rhs))
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            ScalarExpr::Const(c) => Some(*c),
            _ => None,
        }
    }

    pub fn collect_vars(&self, out: &mut Vec<SymVar>) {
        match self {
            ScalarExpr::Const(_) => {}
            ScalarExpr::Var(v) => out.push(*v),
            ScalarExpr::Add(l, r) | ScalarExpr::Sub(l, r) | ScalarExpr::Mul(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
        }
    }

    /// Substitute bound variables and fold constant subtrees.
    pub fn substitute(&self, soln: &SolutionMap) -> ScalarExpr {
        match self {
            ScalarExpr::Const(c) => ScalarExpr::Const(*c),
            ScalarExpr::Var(v) => match soln.get(*v) {
                Some(value) => ScalarExpr::Const(value),
                None => ScalarExpr::Var(*v),
            },
            ScalarExpr::Add(l, r) => fold(
                l.substitute(soln),
                r.substitute(soln),
                i64::wrapping_add,
                ScalarExpr::add,
            ),
            ScalarExpr::Sub(l, r) => fold(
                l.substitute(soln),
                r.substitute(soln),
                i64::wrapping_sub,
                ScalarExpr::sub,
            ),
            ScalarExpr::Mul(l, r) => fold(
                l.substitute(soln),
                r.substitute(soln),
                i64::wrapping_mul,
                ScalarExpr::mul,
            ),
        }
    }
}

fn fold(
    lhs: ScalarExpr,
    rhs: ScalarExpr,
    op: fn(i64, i64) -> i64,
    rebuild: fn(ScalarExpr, ScalarExpr) -> ScalarExpr,
) -> ScalarExpr {
    match (lhs.as_const(), rhs.as_const()) {
        (Some(a), Some(b)) => ScalarExpr::Const(op(a, b)),
        _ => rebuild(lhs, rhs),
    }
}

impl From<&LinearExpr> for ScalarExpr {
    fn from(linear: &LinearExpr) -> Self {
        let mut acc = ScalarExpr::Const(linear.constant);
        for (var, coefficient) in &linear.coefficients {
            let term = ScalarExpr::mul(ScalarExpr::Var(*var), ScalarExpr::Const(*coefficient));
            acc = ScalarExpr::add(acc, term);
        }
        acc
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarExpr::Const(c) if *c < 0 => write!(f, "({c})"),
            ScalarExpr::Const(c) => write!(f, "{c}"),
            ScalarExpr::Var(v) => write!(f, "{v}"),
            ScalarExpr::Add(l, r) => write!(f, "({l} + {r})"),
            ScalarExpr::Sub(l, r) => write!(f, "({l} - {r})"),
            ScalarExpr::Mul(l, r) => write!(f, "({l} * {r})"),
        }
    }
}
