use std::cell::RefCell;
use std::fs;
use std::path::Path;

use pathflip_core::{
    ExplorationReport, ExplorationSession, ExplorerConfig, RunError, SessionError, StopReason,
    TraceCommandRunner,
};
use pathflip_explore::{ConcolicRun, SolveError, SolverBackend};
use pathflip_ir::{CompareOp, Constraint, StringTable};
use tempfile::TempDir;
use test_log::test;

type Respond = Box<dyn Fn(&str) -> Result<Vec<String>, SolveError>>;

struct StubBackend {
    respond: Respond,
    calls: RefCell<usize>,
}

impl StubBackend {
    fn new(respond: impl Fn(&str) -> Result<Vec<String>, SolveError> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: RefCell::new(0),
        }
    }
}

impl SolverBackend for StubBackend {
    fn check(&self, formula: &Path) -> Result<Vec<String>, SolveError> {
        let text = fs::read_to_string(formula)?;
        *self.calls.borrow_mut() += 1;
        (self.respond)(&text)
    }
}

fn lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// Knows the two flips the nested program below needs.
fn nested_solver() -> StubBackend {
    StubBackend::new(|formula| {
        if formula.contains("CHECKSAT x1*(1)+(-10) > 0;") {
            Ok(lines("sat\nx1 : INT = 11;"))
        } else if formula.contains("CHECKSAT x1*(1)+(-42) = 0;") {
            Ok(lines("sat\nx1 : INT = 42;"))
        } else {
            Ok(lines("unsat"))
        }
    })
}

/// `if x > 10 { if x == 42 { .. } }`
fn nested_program(run: &mut ConcolicRun, _strings: &mut StringTable) -> Result<(), RunError> {
    let x = run.int_input();
    let above = x.value > 10;
    run.check_and_set_branch(
        above,
        Some(Constraint::linear(x.expr().plus_constant(-10), CompareOp::Gt)),
        1,
    );
    if above {
        run.check_and_set_branch(
            x.value == 42,
            Some(Constraint::linear(x.expr().plus_constant(-42), CompareOp::Eq)),
            2,
        );
    }
    Ok(())
}

fn workspace(initial_inputs: &str) -> (TempDir, ExplorerConfig) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ExplorerConfig {
        inputs_file: dir.path().join("inputs"),
        history_file: dir.path().join("history.json"),
        ..ExplorerConfig::default()
    };
    config.solver.formula_file = dir.path().join("formula");
    fs::write(&config.inputs_file, initial_inputs).unwrap();
    (dir, config)
}

fn explore(
    config: &ExplorerConfig,
    backend: &StubBackend,
) -> Result<ExplorationReport, SessionError> {
    let mut program = nested_program;
    ExplorationSession::new(config, &mut program, backend).run()
}

#[test]
fn test_nested_branches_are_explored_to_exhaustion() {
    let (_dir, config) = workspace("0\n");
    let backend = nested_solver();

    let report = explore(&config, &backend).unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.iterations, 3);
    assert_eq!(report.inputs, vec![lines("0"), lines("11"), lines("42")]);
    assert_eq!(report.stats.feasible, 2);
    assert_eq!(*backend.calls.borrow(), 2);
    assert_eq!(fs::read_to_string(&config.inputs_file).unwrap(), "42\n");
    // Exhaustion leaves no replay prefix behind.
    assert!(!config.history_file.exists());
}

#[test]
fn test_infeasible_flip_ends_exploration() {
    let (_dir, config) = workspace("0\n");
    let backend = StubBackend::new(|_| Ok(lines("unsat")));

    let report = explore(&config, &backend).unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.stats.infeasible, 1);
    assert_eq!(fs::read_to_string(&config.inputs_file).unwrap(), "0\n");
}

#[test]
fn test_iteration_limit_stops_with_prefix_saved() {
    let (_dir, mut config) = workspace("0\n");
    config.limits.max_iterations = 1;
    let backend = nested_solver();

    let report = explore(&config, &backend).unwrap();

    assert_eq!(report.stop_reason, StopReason::IterationLimitExceeded);
    assert_eq!(report.iterations, 1);
    assert!(config.history_file.exists());
    assert_eq!(fs::read_to_string(&config.inputs_file).unwrap(), "11\n");
}

#[test]
fn test_stale_history_is_discarded_at_start() {
    let (_dir, config) = workspace("0\n");
    fs::write(&config.history_file, "not json").unwrap();
    let backend = nested_solver();

    let report = explore(&config, &backend).unwrap();
    assert_eq!(report.iterations, 3);
}

#[test]
fn test_report_file_is_written() {
    let (dir, mut config) = workspace("0\n");
    let report_path = dir.path().join("report.json");
    config.report_file = Some(report_path.clone());
    let backend = nested_solver();

    let report = explore(&config, &backend).unwrap();

    let written: ExplorationReport =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(written.inputs, report.inputs);
    assert_eq!(written.stop_reason, StopReason::Exhausted);
    assert_eq!(report.distinct_inputs().len(), 3);
}

#[test]
fn test_protocol_error_aborts_session() {
    let (_dir, config) = workspace("0\n");
    let backend = StubBackend::new(|_| Ok(lines("unknown")));

    let err = explore(&config, &backend).unwrap_err();
    assert!(matches!(err, SessionError::Solve(SolveError::Protocol(_))));
}

#[test]
fn test_program_failure_aborts_session() {
    let (_dir, config) = workspace("0\n");
    let backend = nested_solver();
    let mut program = |_: &mut ConcolicRun, _: &mut StringTable| -> Result<(), RunError> {
        Err(RunError::Program("crashed".to_string()))
    };

    let err = ExplorationSession::new(&config, &mut program, &backend)
        .run()
        .unwrap_err();
    assert!(matches!(err, SessionError::Run(RunError::Program(_))));
    assert_eq!(*backend.calls.borrow(), 0);
}

#[cfg(unix)]
#[test]
fn test_trace_command_runner_drives_external_program() {
    let (dir, config) = workspace("0\n");
    let trace_path = dir.path().join("trace.json");
    let script = r#"
x=$(head -n 1 "$PATHFLIP_INPUTS" 2>/dev/null)
if [ "${x:-0}" -gt 10 ]; then taken=true; else taken=false; fi
printf '{"events":[{"event":"int_input"},{"event":"branch","outcome":%s,"constraint":{"linear":{"expr":{"coefficients":{"x1":1},"constant":-10},"op":"gt"}},"site":1}]}' "$taken" > "$PATHFLIP_TRACE"
"#;
    let mut runner = TraceCommandRunner::new(
        "sh",
        vec!["-c".to_string(), script.to_string()],
        config.inputs_file.clone(),
        trace_path,
    );
    let backend = nested_solver();

    let report = ExplorationSession::new(&config, &mut runner, &backend)
        .run()
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.inputs, vec![lines("0"), lines("11")]);
}

#[cfg(unix)]
#[test]
fn test_missing_trace_is_an_error() {
    let (dir, config) = workspace("0\n");
    let mut runner = TraceCommandRunner::new(
        "true",
        Vec::new(),
        config.inputs_file.clone(),
        dir.path().join("trace.json"),
    );
    let backend = nested_solver();

    let err = ExplorationSession::new(&config, &mut runner, &backend)
        .run()
        .unwrap_err();
    assert!(matches!(err, SessionError::Run(RunError::TraceIo { .. })));
}
