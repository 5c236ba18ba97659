use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use pathflip_core::{ExplorationSession, ExplorerConfig, TraceCommandRunner};
use pathflip_explore::ProcessBackend;

#[derive(Debug, Parser)]
#[command(author, version, about = "Concolic test-input generation")]
struct Cli {
    /// JSON config file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Solver executable (overrides the config).
    #[arg(long, value_name = "CMD")]
    solver: Option<String>,

    /// Concrete input file (overrides the config).
    #[arg(long, value_name = "FILE")]
    inputs: Option<PathBuf>,

    /// Trace file the program under test writes.
    #[arg(long, value_name = "FILE", default_value = "trace.json")]
    trace: PathBuf,

    /// Maximum number of runs (overrides the config).
    #[arg(long, value_name = "INT")]
    max_iterations: Option<u64>,

    /// Report file (overrides the config).
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Log debug output (formulas, solver answers).
    #[arg(short, long)]
    verbose: bool,

    /// Program under test and its arguments.
    #[arg(required = true, trailing_var_arg = true, value_name = "PROGRAM")]
    program: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let mut config = match &args.config {
        Some(path) => ExplorerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExplorerConfig::default(),
    };
    if let Some(solver) = args.solver {
        config.solver.command = solver;
    }
    if let Some(inputs) = args.inputs {
        config.inputs_file = inputs;
    }
    if let Some(n) = args.max_iterations {
        config.limits.max_iterations = n;
    }
    if args.report.is_some() {
        config.report_file = args.report;
    }
    config.validate()?;

    let backend = ProcessBackend::from_config(&config.solver).context("starting solver backend")?;
    let (command, program_args) = args
        .program
        .split_first()
        .context("no program given")?;
    let mut runner = TraceCommandRunner::new(
        command.clone(),
        program_args.to_vec(),
        config.inputs_file.clone(),
        args.trace,
    );

    let report = ExplorationSession::new(&config, &mut runner, &backend)
        .run()
        .context("exploration failed")?;

    log::info!(
        "{} runs, {} distinct inputs, stopped: {:?}",
        report.iterations,
        report.distinct_inputs().len(),
        report.stop_reason
    );
    log::info!(
        "solver: {} attempts, {} feasible, {} infeasible, {} quick-unsat, {} retries",
        report.stats.attempts,
        report.stats.feasible,
        report.stats.infeasible,
        report.stats.quick_unsat,
        report.stats.retries
    );
    Ok(())
}
