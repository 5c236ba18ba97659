//! Constraint algebra for concolic exploration.
//!
//! Path constraints recorded during a concrete run, their negation and
//! partial substitution, and their rendering into the textual formula
//! language of the external solver.

pub mod constraint;
pub mod expr;
pub mod intern;
pub mod render;
pub mod solution;
pub mod string;

pub use constraint::{Constraint, LinearRelation, ScalarCompare};
pub use expr::{CompareOp, LinearExpr, ScalarExpr};
pub use intern::{StrId, StringTable};
pub use render::{Layer, RenderContext};
pub use solution::{SolutionMap, SymVar, VarId};
pub use string::{StringExpr, StringOp, StringPattern, StringPredicate};
