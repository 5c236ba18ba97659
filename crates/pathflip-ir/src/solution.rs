//! Solver variables and partial solutions.
//!
//! Every integer the external solver reasons about is a [`SymVar`]: either a
//! whole symbolic input (`x3`) or one character of a symbolic string
//! (`x3__0`). Variables serialize as their solver name so they can key JSON
//! maps directly.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a symbolic input, assigned monotonically per execution.
pub type VarId = u32;

/// A variable as it appears in a solver formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymVar {
    /// Integer-valued input (ints, longs, string lengths).
    Int(VarId),
    /// Character code at `index` of the string input `symbol`.
    Char { symbol: VarId, index: u32 },
}

impl SymVar {
    pub fn is_char(&self) -> bool {
        matches!(self, SymVar::Char { .. })
    }
}

impl fmt::Display for SymVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymVar::Int(id) => write!(f, "x{id}"),
            SymVar::Char { symbol, index } => write!(f, "x{symbol}__{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("not a solver variable name: '{0}'")]
pub struct VarNameError(pub String);

impl FromStr for SymVar {
    type Err = VarNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || VarNameError(s.to_string());
        let rest = s.strip_prefix('x').ok_or_else(bad)?;
        match rest.split_once("__") {
            Some((symbol, index)) => Ok(SymVar::Char {
                symbol: symbol.parse().map_err(|_| bad())?,
                index: index.parse().map_err(|_| bad())?,
            }),
            None => Ok(SymVar::Int(rest.parse().map_err(|_| bad())?)),
        }
    }
}

impl Serialize for SymVar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SymVar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Variable assignment produced by a successful solve.
///
/// Partial by nature: anything missing keeps its previous concrete value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolutionMap {
    values: BTreeMap<SymVar, i64>,
}

impl SolutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var: SymVar, value: i64) -> Option<i64> {
        self.values.insert(var, value)
    }

    pub fn get(&self, var: SymVar) -> Option<i64> {
        self.values.get(&var).copied()
    }

    pub fn int(&self, id: VarId) -> Option<i64> {
        self.get(SymVar::Int(id))
    }

    pub fn char_code(&self, symbol: VarId, index: u32) -> Option<i64> {
        self.get(SymVar::Char { symbol, index })
    }

    pub fn contains(&self, var: SymVar) -> bool {
        self.values.contains_key(&var)
    }

    pub fn extend(&mut self, other: &SolutionMap) {
        self.values.extend(other.iter());
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymVar, i64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(SymVar, i64)> for SolutionMap {
    fn from_iter<T: IntoIterator<Item = (SymVar, i64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
