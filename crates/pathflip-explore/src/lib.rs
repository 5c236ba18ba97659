//! Path exploration: recording runs, picking branches to flip, and solving
//! for the inputs that flip them.

pub mod history;
pub mod inputs;
pub mod run;
pub mod solver;
pub mod strategy;

pub use history::{BranchElement, PathElement, PathHistory, ScopeEdge};
pub use inputs::{ConcreteValue, InputFile, InputFormat, InputRecord};
pub use run::{ConcolicRun, IntInput, StringInput};
pub use solver::{
    ProcessBackend, SolveError, SolveStats, SolverAdapter, SolverBackend, SolverConfig,
    TimeoutPolicy,
};
pub use strategy::{BranchSolver, DfsStrategy, Strategy};
