//! Solving a flipped branch and producing the next input.
//!
//! Each attempt runs two layers. The integer layer solves the prefix plus
//! the negated target with string predicates reduced to length relations.
//! The string layer then re-solves with that integer model substituted,
//! assigning individual characters. When the string layer fails, the
//! integer model is excluded and the integer layer is asked again, up to
//! the retry budget.

pub mod backend;
pub mod formula;
pub mod response;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use pathflip_ir::{Constraint, Layer, SolutionMap, StringTable, SymVar, VarId};

use crate::inputs::{materialize, ConcreteValue, InputFile, InputRecord};
use crate::run::ConcolicRun;
use crate::strategy::BranchSolver;

pub use backend::{ProcessBackend, SolverBackend};
pub use formula::{quick_unsat, Query, QueryBuilder};
pub use response::{exclusion_clause, parse_response, Verdict};

/// Errors that stop a solve attempt.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    #[error("solver I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("solver protocol error: {0}")]
    Protocol(String),

    #[error("failed to start solver '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("solver timed out after {0:?}")]
    Timeout(Duration),
}

impl SolveError {
    /// Whether the on-disk state can no longer be trusted. A timeout leaves
    /// nothing half-written.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SolveError::Timeout(_))
    }
}

/// What to do when a single solver call times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Treat the branch as infeasible and keep searching.
    #[default]
    SkipBranch,
    /// Stop the exploration.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Solver executable.
    pub command: String,
    /// Arguments placed before the formula file.
    pub args: Vec<String>,
    pub formula_file: PathBuf,
    /// Per-invocation limit in milliseconds.
    pub timeout_ms: u64,
    /// Integer-layer attempts per flipped branch.
    pub retry_budget: u32,
    pub timeout_policy: TimeoutPolicy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            command: "cvc4".to_string(),
            args: vec!["--lang".to_string(), "cvc4".to_string()],
            formula_file: PathBuf::from("formula"),
            timeout_ms: 10_000,
            retry_budget: 100,
            timeout_policy: TimeoutPolicy::SkipBranch,
        }
    }
}

impl SolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Counters accumulated across a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveStats {
    /// `solve_at` calls.
    pub attempts: u64,
    pub feasible: u64,
    pub infeasible: u64,
    pub quick_unsat: u64,
    /// String-layer failures answered with an exclusion clause.
    pub retries: u64,
    /// Calls that reached the external solver.
    pub solver_calls: u64,
    pub timeouts_skipped: u64,
}

enum LayerOutcome {
    Sat(Vec<(SymVar, i64)>),
    Unsat,
}

/// Solves against the constraints and inputs of one recorded run.
pub struct SolverAdapter<'a> {
    backend: &'a dyn SolverBackend,
    config: &'a SolverConfig,
    input_file: &'a InputFile,
    constraints: &'a [Constraint],
    inputs: &'a [InputRecord],
    int_vars: Vec<VarId>,
    strings: &'a StringTable,
    stats: &'a mut SolveStats,
    solution: Option<SolutionMap>,
}

impl<'a> SolverAdapter<'a> {
    pub fn new(
        backend: &'a dyn SolverBackend,
        config: &'a SolverConfig,
        input_file: &'a InputFile,
        run: &'a ConcolicRun,
        strings: &'a StringTable,
        stats: &'a mut SolveStats,
    ) -> Self {
        Self {
            backend,
            config,
            input_file,
            constraints: run.constraints(),
            inputs: run.inputs(),
            int_vars: run
                .inputs()
                .iter()
                .filter_map(|record| match record {
                    InputRecord::Value {
                        symbol,
                        value: ConcreteValue::Int(_),
                    } => Some(*symbol),
                    _ => None,
                })
                .collect(),
            strings,
            stats,
            solution: None,
        }
    }

    /// Solution written by the last feasible `solve_at`.
    pub fn solution(&self) -> Option<&SolutionMap> {
        self.solution.as_ref()
    }

    fn solve(&mut self, index: usize) -> Result<bool, SolveError> {
        let mut extra: Option<String> = None;
        for attempt in 0..self.config.retry_budget {
            let mut soln = SolutionMap::new();
            let int_model =
                match self.check_layer(index, Layer::Int, extra.as_deref(), &mut soln)? {
                    LayerOutcome::Sat(model) => model,
                    LayerOutcome::Unsat => return Ok(false),
                };
            if let LayerOutcome::Sat(_) = self.check_layer(index, Layer::Str, None, &mut soln)? {
                let lines = materialize(self.inputs, &soln, &self.input_file.format);
                self.input_file.write_lines(&lines)?;
                self.solution = Some(soln);
                return Ok(true);
            }

            self.stats.retries += 1;
            let Some(clause) = exclusion_clause(&int_model) else {
                debug!("string layer failed with an empty integer model at {index}");
                return Ok(false);
            };
            debug!("string layer failed at {index} (attempt {attempt}); excluding {clause}");
            extra = Some(match extra {
                Some(prev) => format!("{prev} AND {clause}"),
                None => clause,
            });
        }
        debug!("retry budget exhausted at {index}");
        Ok(false)
    }

    /// One query: write the formula, run the solver, fold the model into
    /// `soln`.
    fn check_layer(
        &mut self,
        index: usize,
        layer: Layer,
        extra: Option<&str>,
        soln: &mut SolutionMap,
    ) -> Result<LayerOutcome, SolveError> {
        if layer == Layer::Int && quick_unsat(self.constraints, index) {
            debug!("quick unsat at {index}");
            self.stats.quick_unsat += 1;
            return Ok(LayerOutcome::Unsat);
        }

        let query = QueryBuilder::new(self.constraints, index, self.strings)
            .with_int_vars(&self.int_vars)
            .build(layer, soln, extra);
        if query.trivially_sat {
            return Ok(LayerOutcome::Sat(Vec::new()));
        }

        let path = &self.config.formula_file;
        debug!("{layer:?} formula for {index}:\n{}", query.text);
        fs::write(path, &query.text)?;
        self.stats.solver_calls += 1;
        let lines = self.backend.check(path)?;

        match parse_response(&lines)? {
            Verdict::Sat(model) => {
                for (var, value) in &model {
                    soln.insert(*var, *value);
                }
                Ok(LayerOutcome::Sat(model))
            }
            Verdict::Unsat => Ok(LayerOutcome::Unsat),
        }
    }
}

impl BranchSolver for SolverAdapter<'_> {
    fn solve_at(&mut self, constraint_index: usize) -> Result<bool, SolveError> {
        self.stats.attempts += 1;
        let feasible = match self.solve(constraint_index) {
            Ok(feasible) => feasible,
            Err(e) if !e.is_fatal() && self.config.timeout_policy == TimeoutPolicy::SkipBranch => {
                warn!("skipping {constraint_index}: {e}");
                self.stats.timeouts_skipped += 1;
                false
            }
            Err(e) => {
                error!("solving at {constraint_index} failed: {e}");
                return Err(e);
            }
        };
        if feasible {
            self.stats.feasible += 1;
        } else {
            self.stats.infeasible += 1;
        }
        info!("Feasible = {feasible} at {constraint_index}");
        Ok(feasible)
    }
}
