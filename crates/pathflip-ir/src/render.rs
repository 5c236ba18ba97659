//! Rendering constraints in the solver's presentation language.
//!
//! Output follows the CVC presentation syntax: linear sums as
//! `x1*(2) + x2*(1)+(-5) = 0`, combinators as parenthesized `AND`/`OR`
//! chains, and `TRUE`/`FALSE` sentinels. String predicates are lowered for
//! the requested [`Layer`] first. Every variable written is recorded in the
//! caller's free-variable set so the formula can declare it.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::constraint::Constraint;
use crate::intern::StringTable;
use crate::solution::{SolutionMap, SymVar};

/// Which half of the two-layer protocol a formula is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Integer relations; string predicates contribute length relations.
    Int,
    /// Character clauses, with lengths fixed by an integer-layer solution.
    Str,
}

pub struct RenderContext<'a> {
    pub layer: Layer,
    /// Partial solution guiding string lowering (known lengths, characters).
    pub soln: &'a SolutionMap,
    pub strings: &'a StringTable,
}

impl<'a> RenderContext<'a> {
    pub fn new(layer: Layer, soln: &'a SolutionMap, strings: &'a StringTable) -> Self {
        Self {
            layer,
            soln,
            strings,
        }
    }

    pub fn render(&self, constraint: &Constraint, free_vars: &mut BTreeSet<SymVar>) -> String {
        let mut out = String::new();
        self.write(constraint, &mut out, free_vars);
        out
    }

    fn write(&self, constraint: &Constraint, out: &mut String, free_vars: &mut BTreeSet<SymVar>) {
        match constraint {
            Constraint::Linear(rel) => {
                free_vars.extend(rel.expr.vars());
                let _ = write!(out, "{} {} 0", rel.expr, rel.op.token());
            }
            Constraint::Compare(cmp) => {
                let mut vars = Vec::new();
                cmp.left.collect_vars(&mut vars);
                cmp.right.collect_vars(&mut vars);
                free_vars.extend(vars);
                let _ = write!(out, "({})-({}) {} 0", cmp.left, cmp.right, cmp.op.token());
            }
            Constraint::Or(children) => {
                self.write_chain(children, " OR ", out, free_vars);
                if children.is_empty() {
                    out.push_str(" TRUE ");
                }
            }
            Constraint::And(children) => {
                self.write_chain(children, " AND ", out, free_vars);
                if children.is_empty() {
                    out.push_str(" FALSE ");
                }
            }
            Constraint::Not(pred) => {
                let lowered = pred.lower(false, self.layer, self.soln, self.strings);
                self.write(&lowered, out, free_vars);
            }
            Constraint::String(pred) => {
                let lowered = pred.lower(true, self.layer, self.soln, self.strings);
                self.write(&lowered, out, free_vars);
            }
            Constraint::True => out.push_str(" TRUE "),
            Constraint::False => out.push_str(" FALSE "),
        }
    }

    fn write_chain(
        &self,
        children: &[Constraint],
        separator: &str,
        out: &mut String,
        free_vars: &mut BTreeSet<SymVar>,
    ) {
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                out.push_str(separator);
            }
            out.push('(');
            self.write(child, out, free_vars);
            out.push(')');
        }
    }
}

/// Declaration block for `free_vars`, one `INT` declaration per line.
pub fn declarations(free_vars: &BTreeSet<SymVar>) -> String {
    let mut out = String::new();
    for var in free_vars {
        let _ = writeln!(out, "{var} : INT;");
    }
    out
}
