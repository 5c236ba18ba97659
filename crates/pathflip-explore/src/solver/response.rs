//! Parsing the solver's answer.
//!
//! The first line decides: `sat...` is followed by countermodel lines of
//! the form `x3 : INT = 7;`, a line containing `unsat` means infeasible,
//! anything else is a protocol violation.

use std::fmt::Write;

use pathflip_ir::SymVar;

use super::SolveError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Assignments in the order the solver printed them.
    Sat(Vec<(SymVar, i64)>),
    Unsat,
}

pub fn parse_response(lines: &[String]) -> Result<Verdict, SolveError> {
    let Some(first) = lines.first() else {
        return Err(SolveError::Protocol("solver produced no output".to_string()));
    };
    if !first.starts_with("sat") {
        if first.contains("unsat") {
            return Ok(Verdict::Unsat);
        }
        return Err(SolveError::Protocol(format!("unexpected solver answer: '{first}'")));
    }

    let mut model = Vec::new();
    for line in &lines[1..] {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 5 {
            continue;
        }
        let var: SymVar = tokens[0]
            .parse()
            .map_err(|e| SolveError::Protocol(format!("{e} in '{line}'")))?;
        let raw = tokens[4].split(';').next().unwrap_or_default();
        let value: i64 = raw
            .parse()
            .map_err(|_| SolveError::Protocol(format!("bad value '{raw}' in '{line}'")))?;
        model.push((var, value));
    }
    Ok(Verdict::Sat(model))
}

/// `(NOT ((x1 = 5 ) AND (x2 = 3 )))`, excluding exactly `model`. `None`
/// for an empty model, which cannot be excluded.
pub fn exclusion_clause(model: &[(SymVar, i64)]) -> Option<String> {
    if model.is_empty() {
        return None;
    }
    let mut conj = String::new();
    for (i, (var, value)) in model.iter().enumerate() {
        if i > 0 {
            conj.push_str(" AND ");
        }
        let _ = write!(conj, "({var} = {value} )");
    }
    Some(format!("(NOT ({conj}))"))
}
