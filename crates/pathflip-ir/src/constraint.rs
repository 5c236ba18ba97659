//! Path constraints.
//!
//! A [`Constraint`] is an immutable predicate recorded at a branch point.
//! Every operation is an exhaustive match over the closed set of variants:
//! - `Linear`: `Σ coeff·var + constant <op> 0`
//! - `Compare`: `(left) - (right) <op> 0` over arbitrary scalar trees
//! - `And` / `Or`: ordered combinators
//! - `Not`: negation of a string predicate (all other variants negate
//!   structurally, so `Not` never wraps anything else)
//! - `String`: a string predicate, lowered to integers only when rendered
//! - `True` / `False`

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::expr::{CompareOp, LinearExpr, ScalarExpr};
use crate::intern::{StrId, StringTable};
use crate::solution::{SolutionMap, SymVar};
use crate::string::StringPredicate;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinearRelation {
    pub expr: LinearExpr,
    pub op: CompareOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarCompare {
    pub left: ScalarExpr,
    pub right: ScalarExpr,
    pub op: CompareOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Linear(LinearRelation),
    Compare(ScalarCompare),
    Or(Vec<Constraint>),
    And(Vec<Constraint>),
    Not(StringPredicate),
    String(StringPredicate),
    True,
    False,
}

impl From<bool> for Constraint {
    fn from(value: bool) -> Self {
        if value {
            Constraint::True
        } else {
            Constraint::False
        }
    }
}

impl Constraint {
    pub fn linear(expr: LinearExpr, op: CompareOp) -> Self {
        Constraint::Linear(LinearRelation { expr, op })
    }

    pub fn compare(left: ScalarExpr, right: ScalarExpr, op: CompareOp) -> Self {
        Constraint::Compare(ScalarCompare { left, right, op })
    }

    /// Conjunction with `True`/`False` folded away. Unlike a raw
    /// `And(vec![])`, an empty conjunction here is `True`.
    pub fn conjunction(children: Vec<Constraint>) -> Self {
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Constraint::False => return Constraint::False,
                Constraint::True => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Constraint::True,
            1 => kept.remove(0),
            _ => Constraint::And(kept),
        }
    }

    /// Disjunction with `True`/`False` folded away; empty is `False`.
    pub fn disjunction(children: Vec<Constraint>) -> Self {
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Constraint::True => return Constraint::True,
                Constraint::False => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Constraint::False,
            1 => kept.remove(0),
            _ => Constraint::Or(kept),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Constraint::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Constraint::False)
    }

    pub fn is_string_predicate(&self) -> bool {
        matches!(self, Constraint::String(_) | Constraint::Not(_))
    }

    pub fn negate(&self) -> Constraint {
        match self {
            Constraint::Linear(rel) => Constraint::Linear(LinearRelation {
                expr: rel.expr.clone(),
                op: rel.op.negate(),
            }),
            Constraint::Compare(cmp) => Constraint::Compare(ScalarCompare {
                left: cmp.left.clone(),
                right: cmp.right.clone(),
                op: cmp.op.negate(),
            }),
            Constraint::Or(children) => {
                Constraint::And(children.iter().map(Constraint::negate).collect())
            }
            Constraint::And(children) => {
                Constraint::Or(children.iter().map(Constraint::negate).collect())
            }
            Constraint::Not(pred) => Constraint::String(pred.clone()),
            Constraint::String(pred) => Constraint::Not(pred.clone()),
            Constraint::True => Constraint::False,
            Constraint::False => Constraint::True,
        }
    }

    /// Replace bound variables by their values and fold whatever became
    /// fully determined. Idempotent for a fixed `soln`.
    ///
    /// An empty `And`/`Or` is returned unchanged: its rendering is a fixed
    /// sentinel, not the identity of the operator.
    pub fn substitute(&self, soln: &SolutionMap, strings: &StringTable) -> Constraint {
        match self {
            Constraint::Linear(rel) => {
                let expr = rel.expr.substitute(soln);
                if expr.is_constant() {
                    Constraint::from(rel.op.holds(expr.constant))
                } else {
                    Constraint::linear(expr, rel.op)
                }
            }
            Constraint::Compare(cmp) => {
                let left = cmp.left.substitute(soln);
                let right = cmp.right.substitute(soln);
                match (left.as_const(), right.as_const()) {
                    (Some(l), Some(r)) => Constraint::from(cmp.op.holds(l.wrapping_sub(r))),
                    _ => Constraint::compare(left, right, cmp.op),
                }
            }
            Constraint::And(children) if children.is_empty() => self.clone(),
            Constraint::Or(children) if children.is_empty() => self.clone(),
            Constraint::And(children) => Constraint::conjunction(
                children.iter().map(|c| c.substitute(soln, strings)).collect(),
            ),
            Constraint::Or(children) => Constraint::disjunction(
                children.iter().map(|c| c.substitute(soln, strings)).collect(),
            ),
            Constraint::Not(pred) => match pred.evaluate(soln, strings) {
                Some(value) => Constraint::from(!value),
                None => self.clone(),
            },
            Constraint::String(pred) => match pred.evaluate(soln, strings) {
                Some(value) => Constraint::from(value),
                None => self.clone(),
            },
            Constraint::True => Constraint::True,
            Constraint::False => Constraint::False,
        }
    }

    /// Deep equality; string predicates compare operator, subject and
    /// pattern exactly.
    pub fn structurally_equals(&self, other: &Constraint) -> bool {
        self == other
    }

    /// Integer variables mentioned. String predicates contribute the length
    /// variables of their symbolic parts.
    pub fn free_vars(&self) -> BTreeSet<SymVar> {
        let mut out = BTreeSet::new();
        self.collect_free_vars(&mut out);
        out
    }

    fn collect_free_vars(&self, out: &mut BTreeSet<SymVar>) {
        match self {
            Constraint::Linear(rel) => out.extend(rel.expr.vars()),
            Constraint::Compare(cmp) => {
                let mut vars = Vec::new();
                cmp.left.collect_vars(&mut vars);
                cmp.right.collect_vars(&mut vars);
                out.extend(vars);
            }
            Constraint::Or(children) | Constraint::And(children) => {
                for child in children {
                    child.collect_free_vars(out);
                }
            }
            Constraint::Not(pred) | Constraint::String(pred) => out.extend(pred.length_vars()),
            Constraint::True | Constraint::False => {}
        }
    }

    /// Rewrite every interned literal id, e.g. when importing a constraint
    /// recorded against a different table.
    pub fn remap_strings(&self, remap: &mut dyn FnMut(StrId) -> StrId) -> Constraint {
        match self {
            Constraint::Or(children) => {
                Constraint::Or(children.iter().map(|c| c.remap_strings(remap)).collect())
            }
            Constraint::And(children) => {
                Constraint::And(children.iter().map(|c| c.remap_strings(remap)).collect())
            }
            Constraint::Not(pred) => Constraint::Not(pred.remap_strings(remap)),
            Constraint::String(pred) => Constraint::String(pred.remap_strings(remap)),
            other => other.clone(),
        }
    }
}

impl LinearExpr {
    /// Build the relation `self <op> 0`.
    pub fn compare_to_zero(&self, op: CompareOp) -> Constraint {
        Constraint::linear(self.clone(), op)
    }
}
