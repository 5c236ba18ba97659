//! Building one solver query.
//!
//! Layout of a formula file:
//!
//! ```text
//! x1 : INT;
//! x2 : INT;
//! ASSERT <prefix constraint 0>;
//! ...
//! ASSERT <exclusion clauses>;
//! CHECKSAT <negated target>;
//! COUNTERMODEL;
//! ```
//!
//! Every `int` input appearing in the query is bounded to the `i32` range,
//! so a solved value can be read back by the next run. In the string layer
//! every character variable is additionally bounded to printable ASCII,
//! since an input line cannot carry a newline.

use std::collections::BTreeSet;
use std::fmt::Write;

use pathflip_ir::render::declarations;
use pathflip_ir::{Constraint, Layer, RenderContext, SolutionMap, StringTable, SymVar, VarId};

/// Smallest and largest character code the string layer may assign.
pub const CHAR_CODE_RANGE: (i64, i64) = (32, 126);

/// Range of a solved `int` input.
pub const INT_RANGE: (i64, i64) = (i32::MIN as i64, i32::MAX as i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    /// Every substituted constraint folded to `True`: satisfiable without
    /// asking the solver.
    pub trivially_sat: bool,
}

/// Negating `constraints[target]` contradicts an identical string predicate
/// already asserted earlier in the prefix.
pub fn quick_unsat(constraints: &[Constraint], target: usize) -> bool {
    let Some(last) = constraints.get(target) else {
        return false;
    };
    last.is_string_predicate()
        && constraints[..target]
            .iter()
            .any(|earlier| earlier.structurally_equals(last))
}

pub struct QueryBuilder<'a> {
    pub constraints: &'a [Constraint],
    pub target: usize,
    pub strings: &'a StringTable,
    /// Variables holding `int` (not `long`) inputs.
    pub int_vars: &'a [VarId],
}

impl<'a> QueryBuilder<'a> {
    pub fn new(constraints: &'a [Constraint], target: usize, strings: &'a StringTable) -> Self {
        Self {
            constraints,
            target,
            strings,
            int_vars: &[],
        }
    }

    pub fn with_int_vars(mut self, int_vars: &'a [VarId]) -> Self {
        self.int_vars = int_vars;
        self
    }

    /// Query for `layer`, with `soln` substituted and `extra` asserted
    /// after the prefix.
    pub fn build(&self, layer: Layer, soln: &SolutionMap, extra: Option<&str>) -> Query {
        let ctx = RenderContext::new(layer, soln, self.strings);
        let mut free_vars = BTreeSet::new();
        let mut body = String::new();
        let mut trivially_sat = true;

        for constraint in &self.constraints[..self.target] {
            let c = constraint.substitute(soln, self.strings);
            trivially_sat &= c.is_true();
            let _ = writeln!(body, "ASSERT {};", ctx.render(&c, &mut free_vars));
        }
        if let Some(extra) = extra {
            let _ = writeln!(body, "ASSERT {extra};");
        }
        let negated = self.constraints[self.target]
            .negate()
            .substitute(soln, self.strings);
        trivially_sat &= negated.is_true();
        let _ = writeln!(body, "CHECKSAT {};", ctx.render(&negated, &mut free_vars));
        body.push_str("COUNTERMODEL;\n");

        let mut text = declarations(&free_vars);
        text.push_str(&int_bounds(&free_vars, self.int_vars));
        if layer == Layer::Str {
            text.push_str(&char_bounds(&free_vars));
        }
        text.push_str(&body);
        Query {
            text,
            trivially_sat,
        }
    }
}

fn int_bounds(free_vars: &BTreeSet<SymVar>, int_vars: &[VarId]) -> String {
    let (lo, hi) = INT_RANGE;
    let mut out = String::new();
    for var in free_vars {
        if let SymVar::Int(id) = var {
            if int_vars.contains(id) {
                let _ = writeln!(out, "ASSERT ({var} >= ({lo})) AND ({var} <= {hi});");
            }
        }
    }
    out
}

fn char_bounds(free_vars: &BTreeSet<SymVar>) -> String {
    let (lo, hi) = CHAR_CODE_RANGE;
    let mut out = String::new();
    for var in free_vars.iter().filter(|v| v.is_char()) {
        let _ = writeln!(out, "ASSERT ({var} >= {lo}) AND ({var} <= {hi});");
    }
    out
}
