//! The exploration loop.
//!
//! Each iteration runs the program once on the current input file, asks
//! the strategy for a branch to flip, and saves the flipped prefix for the
//! next run to replay. The solver rewrites the input file as a side effect
//! of a successful flip. The loop ends when the strategy finds nothing, a
//! resource limit is hit, or a fatal error occurs.

use log::{error, info};

use pathflip_explore::{
    ConcolicRun, DfsStrategy, InputFile, SolveError, SolveStats, SolverAdapter, SolverBackend,
    Strategy,
};
use pathflip_ir::StringTable;

use crate::config::ExplorerConfig;
use crate::history_store::{HistoryError, HistoryStore};
use crate::limits::{ResourceChecker, StopReason};
use crate::report::ExplorationReport;
use crate::runner::{ProgramRunner, RunError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("program run failed: {0}")]
    Run(#[from] RunError),

    #[error("solving failed: {0}")]
    Solve(#[from] SolveError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("input file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ExplorationSession<'a> {
    config: &'a ExplorerConfig,
    runner: &'a mut dyn ProgramRunner,
    backend: &'a dyn SolverBackend,
    strategy: Box<dyn Strategy>,
    strings: StringTable,
    stats: SolveStats,
    store: HistoryStore,
    input_file: InputFile,
}

impl<'a> ExplorationSession<'a> {
    pub fn new(
        config: &'a ExplorerConfig,
        runner: &'a mut dyn ProgramRunner,
        backend: &'a dyn SolverBackend,
    ) -> Self {
        Self {
            config,
            runner,
            backend,
            strategy: Box::new(DfsStrategy::new()),
            strings: StringTable::new(),
            stats: SolveStats::default(),
            store: HistoryStore::new(config.history_file.clone()),
            input_file: config.input_file(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Explore until exhaustion or a limit. Writes the report when a report
    /// file is configured.
    pub fn run(&mut self) -> Result<ExplorationReport, SessionError> {
        let checker = ResourceChecker::new(self.config.limits.clone());
        self.store.clear()?;
        info!("exploring with strategy '{}'", self.strategy.name());

        let mut iterations = 0u64;
        let mut inputs = Vec::new();
        let stop_reason = loop {
            if let Some(reason) = checker.check(iterations) {
                break reason;
            }
            match self.iterate(&mut inputs) {
                Ok(Some(_)) => iterations += 1,
                Ok(None) => {
                    iterations += 1;
                    break StopReason::Exhausted;
                }
                Err(e) => {
                    error!(
                        "iteration {} aborted: {e} (inputs file {}, history file {})",
                        iterations + 1,
                        self.config.inputs_file.display(),
                        self.config.history_file.display()
                    );
                    return Err(e);
                }
            }
        };

        info!("stopped after {iterations} iterations: {stop_reason:?}");
        let report = ExplorationReport {
            iterations,
            stop_reason,
            stats: self.stats.clone(),
            inputs,
            elapsed_secs: checker.elapsed_secs(),
        };
        if let Some(path) = &self.config.report_file {
            report.write(path)?;
        }
        Ok(report)
    }

    /// One run plus one search. Returns the flipped history index.
    fn iterate(&mut self, inputs: &mut Vec<Vec<String>>) -> Result<Option<usize>, SessionError> {
        let lines = self.input_file.read_lines()?;
        let expected = self.store.load()?;
        let mut run = ConcolicRun::new(
            lines.clone(),
            expected,
            self.config.input_format.clone(),
            self.config.max_string_length,
        );
        self.runner.run(&mut run, &mut self.strings)?;
        inputs.push(lines);
        info!(
            "run {}: {} history elements, {} constraints, {} inputs",
            inputs.len(),
            run.history().len(),
            run.constraints().len(),
            run.inputs().len()
        );

        let mut adapter = SolverAdapter::new(
            self.backend,
            &self.config.solver,
            &self.input_file,
            &run,
            &self.strings,
            &mut self.stats,
        );
        let found = self.strategy.solve(run.history(), &mut adapter)?;
        match found {
            Some(index) => self.store.save(&run.history().flipped_prefix(index))?,
            None => self.store.clear()?,
        }
        Ok(found)
    }
}
