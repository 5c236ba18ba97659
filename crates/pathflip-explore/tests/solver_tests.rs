use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pathflip_explore::inputs::{InputFile, InputFormat};
use pathflip_explore::run::ConcolicRun;
use pathflip_explore::solver::{
    ProcessBackend, SolveError, SolveStats, SolverAdapter, SolverBackend, SolverConfig,
    TimeoutPolicy,
};
use pathflip_explore::strategy::{BranchSolver, DfsStrategy, Strategy};
use pathflip_ir::{
    CompareOp, Constraint, SolutionMap, StringOp, StringPattern, StringPredicate, StringTable,
    SymVar,
};
use tempfile::TempDir;
use test_log::test;

type Respond = Box<dyn Fn(&str) -> Result<Vec<String>, SolveError>>;

/// Answers each formula through a closure and keeps every formula it saw.
struct StubBackend {
    respond: Respond,
    formulas: RefCell<Vec<String>>,
}

impl StubBackend {
    fn new(respond: impl Fn(&str) -> Result<Vec<String>, SolveError> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            formulas: RefCell::new(Vec::new()),
        }
    }

    /// Plays back `responses` in order.
    fn scripted(responses: &[&str]) -> Self {
        let responses: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
        let next = RefCell::new(0usize);
        Self::new(move |_| {
            let mut i = next.borrow_mut();
            let text = responses.get(*i).cloned().unwrap_or_default();
            *i += 1;
            Ok(text.lines().map(str::to_string).collect())
        })
    }

    fn calls(&self) -> usize {
        self.formulas.borrow().len()
    }
}

impl SolverBackend for StubBackend {
    fn check(&self, formula: &Path) -> Result<Vec<String>, SolveError> {
        let text = fs::read_to_string(formula)?;
        let answer = (self.respond)(&text);
        self.formulas.borrow_mut().push(text);
        answer
    }
}

struct Workspace {
    dir: TempDir,
    config: SolverConfig,
    input_file: InputFile,
}

impl Workspace {
    fn new(inputs: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let inputs_path = dir.path().join("inputs");
        fs::write(&inputs_path, inputs).unwrap();
        let config = SolverConfig {
            formula_file: dir.path().join("formula"),
            ..SolverConfig::default()
        };
        Self {
            input_file: InputFile::new(inputs_path, InputFormat::default()),
            config,
            dir,
        }
    }

    fn run(&self) -> ConcolicRun {
        let lines = self.input_file.read_lines().unwrap();
        ConcolicRun::new(lines, Vec::new(), InputFormat::default(), 100)
    }

    fn inputs(&self) -> String {
        fs::read_to_string(&self.input_file.path).unwrap()
    }

    fn backup(&self) -> PathBuf {
        self.dir.path().join("inputs.bak")
    }
}

/// Three int inputs with a branch `x3 - 3 = 0` taken true.
fn three_ints(ws: &Workspace) -> ConcolicRun {
    let mut run = ws.run();
    let _a = run.int_input();
    let _b = run.int_input();
    let c = run.int_input();
    let cond = Constraint::linear(c.expr().plus_constant(-3), CompareOp::Eq);
    run.check_and_set_branch(c.value == 3, Some(cond), 1);
    run
}

#[test]
fn test_sat_model_rewrites_only_the_solved_input() {
    let ws = Workspace::new("1\n2\n3\n");
    let run = three_ints(&ws);
    let strings = StringTable::new();
    let backend = StubBackend::scripted(&["sat\nx3 : INT = 7;"]);
    let mut stats = SolveStats::default();

    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(adapter.solve_at(0).unwrap());
    let expected: SolutionMap = [(SymVar::Int(3), 7)].into_iter().collect();
    assert_eq!(adapter.solution(), Some(&expected));
    drop(adapter);

    assert_eq!(ws.inputs(), "1\n2\n7\n");
    assert_eq!(fs::read_to_string(ws.backup()).unwrap(), "1\n2\n3\n");
    // The string layer folds to TRUE once x3 = 7 is substituted.
    assert_eq!(backend.calls(), 1);
    assert_eq!(stats.feasible, 1);

    let formulas = backend.formulas.borrow();
    let formula = &formulas[0];
    assert!(formula.starts_with("x3 : INT;\n"));
    // Solved ints must stay readable as i32 by the next run.
    assert!(formula.contains("ASSERT (x3 >= (-2147483648)) AND (x3 <= 2147483647);"));
    assert!(formula.contains("CHECKSAT x3*(1)+(-3) /= 0;"));
    assert!(formula.ends_with("COUNTERMODEL;\n"));
}

#[test]
fn test_long_inputs_are_unbounded_and_read_back() {
    let ws = Workspace::new("0\n");
    let mut run = ws.run();
    let big = run.long_input();
    let cond = Constraint::linear(big.expr().plus_constant(-2_147_483_647), CompareOp::Gt);
    run.check_and_set_branch(big.value > 2_147_483_647, Some(cond), 1);

    let strings = StringTable::new();
    let backend = StubBackend::scripted(&["sat\nx1 : INT = 3000000000;"]);
    let mut stats = SolveStats::default();
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(adapter.solve_at(0).unwrap());
    drop(adapter);

    assert!(!backend.formulas.borrow()[0].contains("(x1 >="));
    assert_eq!(ws.inputs(), "3000000000\n");
    assert_eq!(ws.run().long_input().value, 3_000_000_000);
}

#[test]
fn test_unsat_leaves_inputs_untouched() {
    let ws = Workspace::new("1\n2\n3\n");
    let run = three_ints(&ws);
    let strings = StringTable::new();
    let backend = StubBackend::scripted(&["unsat"]);
    let mut stats = SolveStats::default();

    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(!adapter.solve_at(0).unwrap());
    assert!(adapter.solution().is_none());
    drop(adapter);

    assert_eq!(ws.inputs(), "1\n2\n3\n");
    assert!(!ws.backup().exists());
    assert_eq!(stats.infeasible, 1);
}

fn equals_ab(strings: &mut StringTable, run: &mut ConcolicRun) -> Constraint {
    let s = run.string_input(strings);
    let ab = strings.intern("ab");
    Constraint::String(StringPredicate::new(
        StringOp::Equals,
        s.expr(),
        StringPattern::Literal(ab),
    ))
}

#[test]
fn test_repeated_string_predicate_is_unsat_without_solver() {
    let ws = Workspace::new("zz\n");
    let mut strings = StringTable::new();
    let mut run = ws.run();
    let pred = equals_ab(&mut strings, &mut run);
    run.check_and_set_branch(false, Some(pred.clone()), 1);
    run.check_and_set_branch(false, Some(pred), 2);
    // Two length guards precede the predicates.
    assert_eq!(run.constraints().len(), 4);

    let backend = StubBackend::scripted(&[]);
    let mut stats = SolveStats::default();
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(!adapter.solve_at(3).unwrap());
    drop(adapter);

    assert_eq!(backend.calls(), 0);
    assert_eq!(stats.quick_unsat, 1);
}

#[test]
fn test_string_layer_failure_retries_with_exclusion() {
    let ws = Workspace::new("zz\n");
    let mut strings = StringTable::new();
    let mut run = ws.run();
    let pred = equals_ab(&mut strings, &mut run);
    run.check_and_set_branch(false, Some(pred), 1);

    let backend = StubBackend::scripted(&[
        "sat\nx2 : INT = 1;",
        "unsat",
        "sat\nx2 : INT = 2;",
        "sat\nx1__0 : INT = 97;\nx1__1 : INT = 98;",
    ]);
    let mut stats = SolveStats::default();
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(adapter.solve_at(2).unwrap());
    drop(adapter);

    assert_eq!(ws.inputs(), "ab\n");
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.solver_calls, 4);

    let formulas = backend.formulas.borrow();
    assert!(formulas[0].contains("CHECKSAT x2*(1)+(-2) = 0;"));
    assert!(formulas[1].contains("CHECKSAT  FALSE ;"));
    assert!(formulas[2].contains("ASSERT (NOT ((x2 = 1 )));"));
    assert!(formulas[3].contains("x1__0 : INT;"));
    assert!(formulas[3].contains("ASSERT (x1__1 >= 32) AND (x1__1 <= 126);"));
}

#[test]
fn test_retry_budget_exhaustion_is_infeasible() {
    let mut ws = Workspace::new("zz\n");
    ws.config.retry_budget = 3;
    let mut strings = StringTable::new();
    let mut run = ws.run();
    let pred = equals_ab(&mut strings, &mut run);
    run.check_and_set_branch(false, Some(pred), 1);

    let backend = StubBackend::new(|formula| {
        let answer = if formula.contains("CHECKSAT  FALSE ;") {
            "unsat"
        } else {
            "sat\nx2 : INT = 1;"
        };
        Ok(answer.lines().map(str::to_string).collect())
    });
    let mut stats = SolveStats::default();
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(!adapter.solve_at(2).unwrap());
    drop(adapter);

    assert_eq!(backend.calls(), 6);
    assert_eq!(stats.retries, 3);
    assert_eq!(ws.inputs(), "zz\n");
}

#[test]
fn test_protocol_errors_are_fatal() {
    let ws = Workspace::new("1\n2\n3\n");
    let run = three_ints(&ws);
    let strings = StringTable::new();
    let backend = StubBackend::scripted(&["segmentation fault"]);
    let mut stats = SolveStats::default();
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);

    let err = adapter.solve_at(0).unwrap_err();
    assert!(matches!(err, SolveError::Protocol(_)));
    assert!(err.is_fatal());
    assert_eq!(ws.inputs(), "1\n2\n3\n");
}

#[test]
fn test_timeouts_follow_policy() {
    let mut ws = Workspace::new("1\n2\n3\n");
    let run = three_ints(&ws);
    let strings = StringTable::new();
    let backend = StubBackend::new(|_| Err(SolveError::Timeout(Duration::from_millis(5))));

    let mut stats = SolveStats::default();
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(!adapter.solve_at(0).unwrap());
    drop(adapter);
    assert_eq!(stats.timeouts_skipped, 1);

    ws.config.timeout_policy = TimeoutPolicy::Abort;
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(matches!(adapter.solve_at(0), Err(SolveError::Timeout(_))));
}

#[test]
fn test_strategy_drives_adapter_to_deepest_branch() {
    let ws = Workspace::new("5\n");
    let mut run = ws.run();
    let a = run.int_input();
    for k in 0..3 {
        let cond = Constraint::linear(a.expr().plus_constant(-k), CompareOp::Gt);
        run.check_and_set_branch(a.value > k, Some(cond), k as u32);
    }
    let strings = StringTable::new();
    let backend = StubBackend::scripted(&["sat\nx1 : INT = 2;"]);
    let mut stats = SolveStats::default();
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);

    let found = DfsStrategy::new().solve(run.history(), &mut adapter).unwrap();
    assert_eq!(found, Some(2));
    drop(adapter);
    assert_eq!(ws.inputs(), "2\n");
}

// ── Real process ─────────────────────────────────────────────────────

fn sh(script: &str, timeout: Duration) -> ProcessBackend {
    ProcessBackend::new(
        "sh",
        vec!["-c".to_string(), script.to_string(), "solver".to_string()],
        timeout,
    )
    .unwrap()
}

#[test]
fn test_process_backend_reads_stdout_and_drains_stderr() {
    let ws = Workspace::new("1\n2\n3\n");
    let run = three_ints(&ws);
    let strings = StringTable::new();
    let backend = sh(
        "test -s \"$1\" || exit 1; echo noise >&2; echo sat; echo 'x3 : INT = 7;'",
        Duration::from_secs(10),
    );
    let mut stats = SolveStats::default();
    let mut adapter = SolverAdapter::new(&backend, &ws.config, &ws.input_file, &run, &strings, &mut stats);
    assert!(adapter.solve_at(0).unwrap());
    drop(adapter);
    assert_eq!(ws.inputs(), "1\n2\n7\n");
}

#[test]
fn test_process_backend_kills_slow_solver() {
    let ws = Workspace::new("");
    fs::write(&ws.config.formula_file, "COUNTERMODEL;\n").unwrap();
    let backend = sh("sleep 30", Duration::from_millis(200));
    let err = backend.check(&ws.config.formula_file).unwrap_err();
    assert!(matches!(err, SolveError::Timeout(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_lingering_stderr_holder_does_not_outlive_timeout() {
    let ws = Workspace::new("");
    fs::write(&ws.config.formula_file, "COUNTERMODEL;\n").unwrap();
    // The background sleep keeps stderr open after the solver itself exits.
    let backend = sh("echo unsat; sleep 4 >/dev/null & exit 0", Duration::from_millis(300));

    let started = Instant::now();
    let lines = backend.check(&ws.config.formula_file).unwrap();
    assert_eq!(lines, vec!["unsat".to_string()]);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_process_backend_reports_missing_binary() {
    let backend = ProcessBackend::new(
        "pathflip-no-such-solver",
        Vec::new(),
        Duration::from_secs(1),
    )
    .unwrap();
    let err = backend.check(Path::new("formula")).unwrap_err();
    assert!(matches!(err, SolveError::Spawn { .. }));
}
