//! Choosing the next branch to flip.

use crate::history::PathHistory;
use crate::solver::SolveError;

/// Anything that can decide whether the negation of a recorded constraint
/// is feasible, producing the next input when it is.
pub trait BranchSolver {
    /// Solve with the constraint at `constraint_index` negated.
    fn solve_at(&mut self, constraint_index: usize) -> Result<bool, SolveError>;
}

/// A search strategy over the path history.
pub trait Strategy {
    /// History index of the branch that was successfully flipped, or `None`
    /// once every alternative in this history is exhausted.
    fn solve(
        &self,
        history: &PathHistory,
        solver: &mut dyn BranchSolver,
    ) -> Result<Option<usize>, SolveError>;

    /// Name of this strategy (for logging).
    fn name(&self) -> &str;
}

/// Depth-first, deepest-branch-first search.
///
/// Forced branches partition the history. A forced branch that took the
/// false side closes a segment whose open branches are tried (deepest
/// first) before the scan moves on; any forced branch becomes the lower
/// bound of the next segment. The final segment runs to the end of the
/// history.
#[derive(Debug, Clone, Copy, Default)]
pub struct DfsStrategy;

impl DfsStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Try open branches at history indices `(to, from]`, highest first.
    fn dfs(
        history: &PathHistory,
        from: usize,
        to: Option<usize>,
        solver: &mut dyn BranchSolver,
    ) -> Result<Option<usize>, SolveError> {
        let lower = to.map_or(0, |t| t + 1);
        for i in (lower..=from).rev() {
            let Some(branch) = history.get(i).and_then(|e| e.as_branch()) else {
                continue;
            };
            if branch.done {
                continue;
            }
            let Some(constraint_index) = branch.path_constraint_index else {
                continue;
            };
            if solver.solve_at(constraint_index)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

impl Strategy for DfsStrategy {
    fn solve(
        &self,
        history: &PathHistory,
        solver: &mut dyn BranchSolver,
    ) -> Result<Option<usize>, SolveError> {
        if history.is_empty() {
            return Ok(None);
        }
        let mut to: Option<usize> = None;
        for (j, element) in history.elements().iter().enumerate() {
            let Some(branch) = element.as_branch() else {
                continue;
            };
            if !branch.is_force_truth {
                continue;
            }
            if !branch.branch_taken {
                if let Some(found) = Self::dfs(history, j, to, solver)? {
                    return Ok(Some(found));
                }
            }
            to = Some(j);
        }
        Self::dfs(history, history.len() - 1, to, solver)
    }

    fn name(&self) -> &str {
        "dfs"
    }
}
