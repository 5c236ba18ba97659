//! Path history of one concrete run.
//!
//! The history is an append-only list of decision points, index-aligned
//! with the constraint sequence through each branch's
//! `path_constraint_index`. A history may be seeded with the prefix saved
//! by the previous iteration; while the run stays on that prefix, each new
//! branch inherits the saved `done`/`is_force_truth` flags.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use pathflip_ir::Constraint;

/// One recorded branch outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchElement {
    pub branch_taken: bool,
    /// Outcome fixed by the driver rather than by the program.
    pub is_force_truth: bool,
    /// Both outcomes at this point are known explored or infeasible.
    pub done: bool,
    /// Index into the constraint sequence, `None` when the branch carried
    /// no solvable constraint.
    pub path_constraint_index: Option<usize>,
    /// Instrumentation site that produced the branch.
    pub site: u32,
}

impl BranchElement {
    pub fn new(branch_taken: bool, path_constraint_index: Option<usize>, site: u32) -> Self {
        Self {
            branch_taken,
            is_force_truth: false,
            done: false,
            path_constraint_index,
            site,
        }
    }

    /// A branch the search may still flip.
    pub fn is_open(&self) -> bool {
        !self.done && self.path_constraint_index.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeEdge {
    Begin,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathElement {
    Branch(BranchElement),
    Scope { edge: ScopeEdge },
}

impl PathElement {
    pub fn as_branch(&self) -> Option<&BranchElement> {
        match self {
            PathElement::Branch(b) => Some(b),
            PathElement::Scope { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathHistory {
    elements: Vec<PathElement>,
    constraints: Vec<Constraint>,
    /// Prefix predicted by the previous iteration.
    expected: Vec<PathElement>,
    prediction_failed: bool,
}

impl PathHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History that replays `expected` before recording fresh elements.
    pub fn replaying(expected: Vec<PathElement>) -> Self {
        Self {
            expected,
            ..Self::default()
        }
    }

    /// Record a branch. `constraint` must already be oriented to the
    /// outcome actually taken. Returns the history index of the element.
    pub fn record_branch(
        &mut self,
        branch_taken: bool,
        constraint: Option<Constraint>,
        site: u32,
    ) -> usize {
        let index = self.elements.len();
        let path_constraint_index = constraint.map(|c| {
            self.constraints.push(c);
            self.constraints.len() - 1
        });
        let mut element = BranchElement::new(branch_taken, path_constraint_index, site);

        match self.predicted(index) {
            Some(PathElement::Branch(saved)) if saved.branch_taken == branch_taken => {
                element.done = saved.done;
                element.is_force_truth = saved.is_force_truth;
            }
            Some(saved) => {
                let saved = saved.clone();
                self.prediction_failure(index, &saved, branch_taken);
            }
            None => {}
        }

        debug!(
            "branch #{index} at site {site}: taken={branch_taken} constraint={:?}",
            path_constraint_index
        );
        self.elements.push(PathElement::Branch(element));
        index
    }

    pub fn record_scope(&mut self, edge: ScopeEdge) {
        let index = self.elements.len();
        match self.predicted(index) {
            Some(PathElement::Scope { edge: saved }) if *saved == edge => {}
            Some(saved) => {
                let saved = saved.clone();
                warn!("prediction failure at #{index}: expected {saved:?}, got scope {edge:?}");
                self.prediction_failed = true;
            }
            None => {}
        }
        self.elements.push(PathElement::Scope { edge });
    }

    fn predicted(&self, index: usize) -> Option<&PathElement> {
        if self.prediction_failed {
            None
        } else {
            self.expected.get(index)
        }
    }

    fn prediction_failure(&mut self, index: usize, saved: &PathElement, branch_taken: bool) {
        warn!(
            "prediction failure at #{index}: expected {saved:?}, got branch taken={branch_taken}; \
             dropping the rest of the replayed prefix"
        );
        self.prediction_failed = true;
    }

    pub fn set_last_branch_done(&mut self) {
        if let Some(b) = self.last_branch_mut() {
            b.done = true;
        }
    }

    pub fn set_last_branch_forced(&mut self) {
        if let Some(b) = self.last_branch_mut() {
            b.is_force_truth = true;
        }
    }

    fn last_branch_mut(&mut self) -> Option<&mut BranchElement> {
        self.elements.iter_mut().rev().find_map(|e| match e {
            PathElement::Branch(b) => Some(b),
            PathElement::Scope { .. } => None,
        })
    }

    pub fn prediction_failed(&self) -> bool {
        self.prediction_failed
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn get(&self, index: usize) -> Option<&PathElement> {
        self.elements.get(index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn branches(&self) -> impl Iterator<Item = &BranchElement> {
        self.elements.iter().filter_map(PathElement::as_branch)
    }

    /// Prefix `[0, index]` with the branch at `index` flipped and marked
    /// done: what the next run is expected to follow.
    pub fn flipped_prefix(&self, index: usize) -> Vec<PathElement> {
        let mut prefix: Vec<PathElement> = self.elements.iter().take(index + 1).cloned().collect();
        if let Some(PathElement::Branch(b)) = prefix.get_mut(index) {
            b.branch_taken = !b.branch_taken;
            b.done = true;
        }
        prefix
    }
}
