//! Symbolic strings and string predicates.
//!
//! The solver only understands integers, so a string predicate is lowered in
//! two stages, one per solving layer:
//! - [`Layer::Int`]: a relation over string lengths only.
//! - [`Layer::Str`]: with every length fixed by the integer layer, a clause
//!   over per-character variables `x<sym>__<i>`.
//!
//! Lowering happens at render time, never when the predicate is built, so
//! the recorded constraint sequence keeps the predicate in its original form
//! for duplicate detection.

use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::expr::{CompareOp, LinearExpr};
use crate::intern::{StrId, StringTable};
use crate::render::Layer;
use crate::solution::{SolutionMap, SymVar, VarId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringPart {
    /// A string input; `length` is the integer variable holding its length.
    Symbolic { symbol: VarId, length: VarId },
    /// A literal fragment; its length is read from the string table.
    Literal { id: StrId },
}

/// Concatenation of symbolic and literal parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringExpr {
    pub parts: Vec<StringPart>,
}

/// One character position of a string under a (partial) solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharTerm {
    Known(i64),
    Var(SymVar),
}

impl CharTerm {
    fn linear(self) -> LinearExpr {
        match self {
            CharTerm::Known(code) => LinearExpr::constant(code),
            CharTerm::Var(var) => LinearExpr::var(var),
        }
    }
}

impl StringExpr {
    pub fn symbolic(symbol: VarId, length: VarId) -> Self {
        Self {
            parts: vec![StringPart::Symbolic { symbol, length }],
        }
    }

    pub fn literal(id: StrId) -> Self {
        Self {
            parts: vec![StringPart::Literal { id }],
        }
    }

    pub fn concat(&self, other: &StringExpr) -> StringExpr {
        let mut parts = self.parts.clone();
        parts.extend(other.parts.iter().cloned());
        StringExpr { parts }
    }

    /// Length as a linear sum over the length variables of symbolic parts,
    /// plus the table length of every literal part.
    pub fn length(&self, strings: &StringTable) -> LinearExpr {
        self.parts
            .iter()
            .fold(LinearExpr::constant(0), |acc, part| match part {
                StringPart::Symbolic { length, .. } => {
                    acc.plus(&LinearExpr::var(SymVar::Int(*length)))
                }
                StringPart::Literal { id } => {
                    acc.plus_constant(strings.text(*id).chars().count() as i64)
                }
            })
    }

    /// Length variables of the symbolic parts.
    pub fn length_vars(&self) -> impl Iterator<Item = SymVar> + '_ {
        self.parts.iter().filter_map(|part| match part {
            StringPart::Symbolic { length, .. } => Some(SymVar::Int(*length)),
            StringPart::Literal { .. } => None,
        })
    }

    pub fn is_symbolic(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, StringPart::Symbolic { .. }))
    }

    /// Character terms, or `None` while some symbolic length is unbound.
    pub fn chars(&self, soln: &SolutionMap, strings: &StringTable) -> Option<Vec<CharTerm>> {
        let mut out = Vec::new();
        for part in &self.parts {
            match part {
                StringPart::Symbolic { symbol, length } => {
                    let len = soln.int(*length)?.max(0) as u32;
                    out.extend((0..len).map(|index| {
                        let var = SymVar::Char {
                            symbol: *symbol,
                            index,
                        };
                        match soln.get(var) {
                            Some(code) => CharTerm::Known(code),
                            None => CharTerm::Var(var),
                        }
                    }));
                }
                StringPart::Literal { id, .. } => {
                    out.extend(strings.text(*id).chars().map(|c| CharTerm::Known(c as i64)));
                }
            }
        }
        Some(out)
    }

    /// The concrete string, if every length and character is bound.
    pub fn concrete(&self, soln: &SolutionMap, strings: &StringTable) -> Option<String> {
        self.chars(soln, strings)?
            .into_iter()
            .map(|term| match term {
                CharTerm::Known(code) => u32::try_from(code).ok().and_then(char::from_u32),
                CharTerm::Var(_) => None,
            })
            .collect()
    }

    pub fn remap_strings(&self, remap: &mut dyn FnMut(StrId) -> StrId) -> StringExpr {
        StringExpr {
            parts: self
                .parts
                .iter()
                .map(|part| match part {
                    StringPart::Literal { id } => StringPart::Literal { id: remap(*id) },
                    symbolic => symbolic.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringPattern {
    Literal(StrId),
    Symbolic(StringExpr),
}

impl StringPattern {
    pub fn to_expr(&self) -> StringExpr {
        match self {
            StringPattern::Literal(id) => StringExpr::literal(*id),
            StringPattern::Symbolic(expr) => expr.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringOp {
    Equals,
    StartsWith { offset: i64 },
    EndsWith,
    Contains,
    /// Regular-expression match. Opaque to the solver: lowers to `True` in
    /// both layers and only folds when the pattern is matched literally.
    Matches,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringPredicate {
    pub op: StringOp,
    pub subject: StringExpr,
    pub pattern: StringPattern,
}

impl StringPredicate {
    pub fn new(op: StringOp, subject: StringExpr, pattern: StringPattern) -> Self {
        Self {
            op,
            subject,
            pattern,
        }
    }

    /// Integer variables the predicate mentions (lengths of symbolic parts).
    pub fn length_vars(&self) -> Vec<SymVar> {
        let mut vars: Vec<SymVar> = self.subject.length_vars().collect();
        if let StringPattern::Symbolic(expr) = &self.pattern {
            vars.extend(expr.length_vars());
        }
        vars
    }

    /// Lower to the integer form for `layer`. `positive == false` lowers the
    /// negation of the predicate.
    pub fn lower(
        &self,
        positive: bool,
        layer: Layer,
        soln: &SolutionMap,
        strings: &StringTable,
    ) -> Constraint {
        match layer {
            Layer::Int => self.length_relation(positive, strings),
            Layer::Str => self.pattern_clause(positive, soln, strings),
        }
    }

    /// Necessary length condition. The negation of a string predicate does
    /// not constrain lengths, so it lowers to `True`.
    pub fn length_relation(&self, positive: bool, strings: &StringTable) -> Constraint {
        if !positive {
            return Constraint::True;
        }
        let subject = self.subject.length(strings);
        let pattern = self.pattern.to_expr().length(strings);
        let slack = subject.minus(&pattern);
        match self.op {
            StringOp::Equals => Constraint::linear(slack, CompareOp::Eq),
            StringOp::StartsWith { offset } if offset < 0 => Constraint::False,
            StringOp::StartsWith { offset } => {
                Constraint::linear(slack.plus_constant(-offset), CompareOp::Ge)
            }
            StringOp::EndsWith | StringOp::Contains => Constraint::linear(slack, CompareOp::Ge),
            StringOp::Matches => Constraint::True,
        }
    }

    /// Character-level clause, valid once every length is bound in `soln`.
    pub fn pattern_clause(
        &self,
        positive: bool,
        soln: &SolutionMap,
        strings: &StringTable,
    ) -> Constraint {
        if self.op == StringOp::Matches {
            return Constraint::True;
        }
        let pattern = self.pattern.to_expr();
        let (Some(s), Some(p)) = (self.subject.chars(soln, strings), pattern.chars(soln, strings))
        else {
            return Constraint::True;
        };
        let clause = match self.op {
            StringOp::Equals if s.len() != p.len() => Constraint::False,
            StringOp::Equals => aligned_at(&s, &p, 0),
            StringOp::StartsWith { offset } => match usize::try_from(offset) {
                Ok(start) if start + p.len() <= s.len() => aligned_at(&s, &p, start),
                _ => Constraint::False,
            },
            StringOp::EndsWith if p.len() > s.len() => Constraint::False,
            StringOp::EndsWith => aligned_at(&s, &p, s.len() - p.len()),
            StringOp::Contains if p.len() > s.len() => Constraint::False,
            StringOp::Contains => Constraint::disjunction(
                (0..=s.len() - p.len())
                    .map(|start| aligned_at(&s, &p, start))
                    .collect(),
            ),
            StringOp::Matches => Constraint::True,
        };
        if positive {
            clause
        } else {
            clause.negate()
        }
    }

    /// Concrete truth value, if subject and pattern are fully determined.
    pub fn evaluate(&self, soln: &SolutionMap, strings: &StringTable) -> Option<bool> {
        let subject = self.subject.concrete(soln, strings)?;
        let pattern = self.pattern.to_expr().concrete(soln, strings)?;
        match self.op {
            StringOp::Equals => Some(subject == pattern),
            StringOp::StartsWith { offset } => Some(match usize::try_from(offset) {
                Ok(start) if start <= subject.chars().count() => subject
                    .chars()
                    .skip(start)
                    .collect::<String>()
                    .starts_with(&pattern),
                _ => false,
            }),
            StringOp::EndsWith => Some(subject.ends_with(&pattern)),
            StringOp::Contains => Some(subject.contains(&pattern)),
            StringOp::Matches => None,
        }
    }

    pub fn remap_strings(&self, remap: &mut dyn FnMut(StrId) -> StrId) -> StringPredicate {
        StringPredicate {
            op: self.op,
            subject: self.subject.remap_strings(remap),
            pattern: match &self.pattern {
                StringPattern::Literal(id) => StringPattern::Literal(remap(*id)),
                StringPattern::Symbolic(expr) => StringPattern::Symbolic(expr.remap_strings(remap)),
            },
        }
    }
}

/// `s[start + j] == p[j]` for every `j`.
fn aligned_at(s: &[CharTerm], p: &[CharTerm], start: usize) -> Constraint {
    Constraint::conjunction(
        p.iter()
            .enumerate()
            .map(|(j, pc)| char_equals(s[start + j], *pc))
            .collect(),
    )
}

fn char_equals(a: CharTerm, b: CharTerm) -> Constraint {
    match (a, b) {
        (CharTerm::Known(x), CharTerm::Known(y)) => Constraint::from(x == y),
        _ => Constraint::linear(a.linear().minus(&b.linear()), CompareOp::Eq),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (StringTable, StringPredicate) {
        let mut strings = StringTable::new();
        let ab = strings.intern("ab");
        let pred = StringPredicate::new(
            StringOp::StartsWith { offset: 0 },
            StringExpr::symbolic(1, 2),
            StringPattern::Literal(ab),
        );
        (strings, pred)
    }

    #[test]
    fn test_length_relation_for_prefix() {
        let (strings, pred) = setup();
        let relation = pred.length_relation(true, &strings);
        let expected = Constraint::linear(
            LinearExpr::var(SymVar::Int(2)).plus_constant(-2),
            CompareOp::Ge,
        );
        assert_eq!(relation, expected);
        assert_eq!(pred.length_relation(false, &strings), Constraint::True);
    }

    #[test]
    fn test_pattern_clause_pins_prefix_characters() {
        let (strings, pred) = setup();
        let soln: SolutionMap = [(SymVar::Int(2), 3)].into_iter().collect();
        let clause = pred.pattern_clause(true, &soln, &strings);
        let c0 = SymVar::Char { symbol: 1, index: 0 };
        let c1 = SymVar::Char { symbol: 1, index: 1 };
        let expected = Constraint::And(vec![
            Constraint::linear(LinearExpr::var(c0).plus_constant(-('a' as i64)), CompareOp::Eq),
            Constraint::linear(LinearExpr::var(c1).plus_constant(-('b' as i64)), CompareOp::Eq),
        ]);
        assert_eq!(clause, expected);
    }

    #[test]
    fn test_pattern_clause_too_short_is_false() {
        let (strings, pred) = setup();
        let soln: SolutionMap = [(SymVar::Int(2), 1)].into_iter().collect();
        assert_eq!(pred.pattern_clause(true, &soln, &strings), Constraint::False);
        assert_eq!(pred.pattern_clause(false, &soln, &strings), Constraint::True);
    }

    #[test]
    fn test_evaluate_with_bound_characters() {
        let (strings, pred) = setup();
        let soln: SolutionMap = [
            (SymVar::Int(2), 3),
            (SymVar::Char { symbol: 1, index: 0 }, 'a' as i64),
            (SymVar::Char { symbol: 1, index: 1 }, 'b' as i64),
            (SymVar::Char { symbol: 1, index: 2 }, 'z' as i64),
        ]
        .into_iter()
        .collect();
        assert_eq!(pred.evaluate(&soln, &strings), Some(true));
        let partial: SolutionMap = [(SymVar::Int(2), 3)].into_iter().collect();
        assert_eq!(pred.evaluate(&partial, &strings), None);
    }

    #[test]
    fn test_concat_length_adds_literal_size() {
        let mut strings = StringTable::new();
        let suffix = strings.intern("xyz");
        let expr = StringExpr::symbolic(4, 5).concat(&StringExpr::literal(suffix));
        assert_eq!(expr.length(&strings), LinearExpr::var(SymVar::Int(5)).plus_constant(3));
    }

    #[test]
    fn test_remapped_literal_takes_length_from_table() {
        let mut strings = StringTable::new();
        let short = strings.intern("a");
        let long = strings.intern("abcd");
        let expr = StringExpr::symbolic(1, 2).concat(&StringExpr::literal(short));
        let remapped = expr.remap_strings(&mut |_| long);
        assert_eq!(
            remapped.length(&strings),
            LinearExpr::var(SymVar::Int(2)).plus_constant(4)
        );
        assert_eq!(remapped.length_vars().collect::<Vec<_>>(), vec![SymVar::Int(2)]);
    }
}
