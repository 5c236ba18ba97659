//! Executing the program under test.
//!
//! A [`ProgramRunner`] performs one concrete run, reporting inputs and
//! branches to the [`ConcolicRun`]. [`TraceCommandRunner`] runs an external
//! instrumented program that writes its observations to a JSON trace file,
//! then replays that trace.
//!
//! The program reads its inputs from the file named by `PATHFLIP_INPUTS`
//! and writes the trace to `PATHFLIP_TRACE`. Variable ids in the trace's
//! constraints must follow the allocation order of [`ConcolicRun`]: ids
//! start at 1 and increase by one per input, two for a string (symbol,
//! then length). Literal strings are referenced by index into the trace's
//! `strings` table.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use pathflip_explore::ConcolicRun;
use pathflip_ir::{Constraint, StrId, StringTable};

pub const INPUTS_ENV: &str = "PATHFLIP_INPUTS";
pub const TRACE_ENV: &str = "PATHFLIP_TRACE";

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read trace {path}: {source}")]
    TraceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed trace: {0}")]
    TraceFormat(#[from] serde_json::Error),

    #[error("trace refers to unknown string #{0}")]
    UnknownString(u32),

    #[error("program failed: {0}")]
    Program(String),
}

pub trait ProgramRunner {
    fn run(&mut self, run: &mut ConcolicRun, strings: &mut StringTable) -> Result<(), RunError>;
}

impl<F> ProgramRunner for F
where
    F: FnMut(&mut ConcolicRun, &mut StringTable) -> Result<(), RunError>,
{
    fn run(&mut self, run: &mut ConcolicRun, strings: &mut StringTable) -> Result<(), RunError> {
        self(run, strings)
    }
}

/// One observation in a trace file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    IntInput,
    LongInput,
    FloatInput,
    StringInput,
    BeginScope,
    EndScope,
    Branch {
        outcome: bool,
        #[serde(default)]
        constraint: Option<Constraint>,
        #[serde(default)]
        site: u32,
    },
    BranchDone,
    BranchForced,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Literal strings, indexed by the `StrId`s inside constraints.
    #[serde(default)]
    pub strings: Vec<String>,
    pub events: Vec<TraceEvent>,
}

impl Trace {
    /// Feed the trace to `run`, rebinding literal ids to `strings`.
    pub fn replay(&self, run: &mut ConcolicRun, strings: &mut StringTable) -> Result<(), RunError> {
        let ids: Vec<StrId> = self.strings.iter().map(|s| strings.intern(s)).collect();
        for event in &self.events {
            match event {
                TraceEvent::IntInput => {
                    run.int_input();
                }
                TraceEvent::LongInput => {
                    run.long_input();
                }
                TraceEvent::FloatInput => {
                    run.float_input();
                }
                TraceEvent::StringInput => {
                    run.string_input(strings);
                }
                TraceEvent::BeginScope => run.begin_scope(),
                TraceEvent::EndScope => run.end_scope(),
                TraceEvent::Branch {
                    outcome,
                    constraint,
                    site,
                } => {
                    let constraint = match constraint {
                        Some(c) => Some(remap(c, &ids)?),
                        None => None,
                    };
                    run.check_and_set_branch(*outcome, constraint, *site);
                }
                TraceEvent::BranchDone => run.set_last_branch_done(),
                TraceEvent::BranchForced => run.set_last_branch_forced(),
            }
        }
        Ok(())
    }
}

fn remap(constraint: &Constraint, ids: &[StrId]) -> Result<Constraint, RunError> {
    let mut missing = None;
    let remapped = constraint.remap_strings(&mut |id| match ids.get(id.0 as usize) {
        Some(new) => *new,
        None => {
            missing.get_or_insert(id.0);
            id
        }
    });
    match missing {
        Some(id) => Err(RunError::UnknownString(id)),
        None => Ok(remapped),
    }
}

/// Runs `<command> <args...>` once per iteration and replays its trace.
#[derive(Debug, Clone)]
pub struct TraceCommandRunner {
    pub command: String,
    pub args: Vec<String>,
    pub inputs_file: PathBuf,
    pub trace_file: PathBuf,
}

impl TraceCommandRunner {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        inputs_file: impl Into<PathBuf>,
        trace_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            inputs_file: inputs_file.into(),
            trace_file: trace_file.into(),
        }
    }

    fn read_trace(&self) -> Result<Trace, RunError> {
        let text = fs::read_to_string(&self.trace_file).map_err(|source| RunError::TraceIo {
            path: self.trace_file.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl ProgramRunner for TraceCommandRunner {
    fn run(&mut self, run: &mut ConcolicRun, strings: &mut StringTable) -> Result<(), RunError> {
        // A stale trace must never be mistaken for this run's.
        if let Err(e) = fs::remove_file(&self.trace_file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(RunError::TraceIo {
                    path: self.trace_file.clone(),
                    source: e,
                });
            }
        }

        let output = Command::new(&self.command)
            .args(&self.args)
            .env(INPUTS_ENV, &self.inputs_file)
            .env(TRACE_ENV, &self.trace_file)
            .output()
            .map_err(|source| RunError::Spawn {
                command: self.command.clone(),
                source,
            })?;
        debug!("program exited with {}", output.status);
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!("program stderr: {line}");
        }
        if !output.status.success() {
            // A failing run is still a run: the branches it took are in the trace.
            warn!("program under test exited with {}", output.status);
        }

        let trace = self.read_trace()?;
        trace.replay(run, strings)
    }
}
