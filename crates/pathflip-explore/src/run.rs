//! Recording context for one concrete run.
//!
//! The instrumentation layer calls into [`ConcolicRun`] whenever the
//! program under test requests an input or evaluates a branch. The run
//! hands out concrete values from the input file, allocates symbolic
//! variables for them, and builds the path history the search works on.

use std::collections::VecDeque;
use std::str::FromStr;

use log::{debug, warn};

use pathflip_ir::{CompareOp, Constraint, LinearExpr, StrId, StringExpr, StringTable, SymVar, VarId};

use crate::history::{PathElement, PathHistory, ScopeEdge};
use crate::inputs::{ConcreteValue, InputFormat, InputRecord};

/// A symbolic integer input and its concrete value for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntInput {
    pub var: VarId,
    pub value: i64,
}

impl IntInput {
    pub fn expr(&self) -> LinearExpr {
        LinearExpr::var(SymVar::Int(self.var))
    }
}

/// A symbolic string input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringInput {
    pub symbol: VarId,
    pub length: VarId,
    pub value: String,
    /// The concrete value, interned.
    pub interned: StrId,
}

impl StringInput {
    pub fn expr(&self) -> StringExpr {
        StringExpr::symbolic(self.symbol, self.length)
    }
}

#[derive(Debug)]
pub struct ConcolicRun {
    history: PathHistory,
    inputs: Vec<InputRecord>,
    source: VecDeque<String>,
    format: InputFormat,
    next_var: VarId,
    max_string_length: i64,
}

impl ConcolicRun {
    /// A run consuming `lines` as its input stream and replaying `expected`.
    pub fn new(
        lines: Vec<String>,
        expected: Vec<PathElement>,
        format: InputFormat,
        max_string_length: i64,
    ) -> Self {
        Self {
            history: PathHistory::replaying(expected),
            inputs: Vec::new(),
            source: lines.into(),
            format,
            next_var: 1,
            max_string_length,
        }
    }

    fn allocate(&mut self) -> VarId {
        let var = self.next_var;
        self.next_var += 1;
        var
    }

    /// Next line of the stream. Scope markers are consumed only by
    /// `begin_scope`/`end_scope`, so a value that happens to equal a marker
    /// is still read as a value.
    fn next_value_line(&mut self) -> Option<String> {
        self.source.pop_front()
    }

    /// Parse the next line, falling back to the type's default when the
    /// stream is exhausted or the line is garbled.
    fn next_parsed<T: FromStr + Default>(&mut self, kind: &str) -> T {
        let Some(line) = self.next_value_line() else {
            debug!("input stream exhausted; defaulting {kind} input");
            return T::default();
        };
        match line.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("cannot parse '{line}' as {kind} input; using default");
                T::default()
            }
        }
    }

    fn record(&mut self, symbol: VarId, value: ConcreteValue) {
        debug!("input x{symbol} = {value:?}");
        self.inputs.push(InputRecord::Value { symbol, value });
    }

    /// A length guard. When it holds it is marked done: the search never
    /// flips it, but every later query still asserts it.
    fn record_guard(&mut self, holds: bool, constraint: Constraint) {
        self.check_and_set_branch(holds, Some(constraint), 0);
        if holds {
            self.set_last_branch_done();
        }
    }

    /// An `int` input. The solver keeps it within `i32` range (see
    /// [`crate::solver::formula::INT_RANGE`]).
    pub fn int_input(&mut self) -> IntInput {
        let value: i32 = self.next_parsed("int");
        let var = self.allocate();
        self.record(var, ConcreteValue::Int(value));
        IntInput {
            var,
            value: i64::from(value),
        }
    }

    pub fn long_input(&mut self) -> IntInput {
        let value: i64 = self.next_parsed("long");
        let var = self.allocate();
        self.record(var, ConcreteValue::Long(value));
        IntInput { var, value }
    }

    /// Floats are recorded so the input file keeps its shape, but nothing
    /// constrains them.
    pub fn float_input(&mut self) -> f64 {
        let value: f64 = self.next_parsed("float");
        let var = self.allocate();
        self.record(var, ConcreteValue::Float(value));
        value
    }

    /// A string input plus the two length guards `len >= 0` and
    /// `len <= max_string_length`.
    pub fn string_input(&mut self, strings: &mut StringTable) -> StringInput {
        let value = self.next_value_line().unwrap_or_default();
        let symbol = self.allocate();
        let length = self.allocate();
        self.record(
            symbol,
            ConcreteValue::Str {
                text: value.clone(),
                length,
            },
        );

        let len = value.chars().count() as i64;
        let len_expr = LinearExpr::var(SymVar::Int(length));

        self.record_guard(len >= 0, len_expr.compare_to_zero(CompareOp::Ge));
        self.record_guard(
            len <= self.max_string_length,
            len_expr
                .plus_constant(-self.max_string_length)
                .compare_to_zero(CompareOp::Le),
        );

        let interned = strings.intern(&value);
        StringInput {
            symbol,
            length,
            value,
            interned,
        }
    }

    pub fn begin_scope(&mut self) {
        if self.source.front() == Some(&self.format.scope_begin_marker) {
            self.source.pop_front();
        }
        self.inputs.push(InputRecord::ScopeBegin);
        self.history.record_scope(ScopeEdge::Begin);
    }

    pub fn end_scope(&mut self) {
        if self.source.front() == Some(&self.format.scope_end_marker) {
            self.source.pop_front();
        }
        self.inputs.push(InputRecord::ScopeEnd);
        self.history.record_scope(ScopeEdge::End);
    }

    /// Record the outcome of a branch. `constraint` is the branch condition;
    /// it is stored negated when the false side was taken.
    pub fn check_and_set_branch(&mut self, outcome: bool, constraint: Option<Constraint>, site: u32) {
        let oriented = constraint.map(|c| if outcome { c } else { c.negate() });
        self.history.record_branch(outcome, oriented, site);
    }

    pub fn set_last_branch_done(&mut self) {
        self.history.set_last_branch_done();
    }

    pub fn set_last_branch_forced(&mut self) {
        self.history.set_last_branch_forced();
    }

    pub fn history(&self) -> &PathHistory {
        &self.history
    }

    pub fn constraints(&self) -> &[Constraint] {
        self.history.constraints()
    }

    pub fn inputs(&self) -> &[InputRecord] {
        &self.inputs
    }
}
