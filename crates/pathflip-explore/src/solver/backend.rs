//! Running the external solver.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::Runtime;
use tokio::time::{timeout_at, Instant};

use super::{SolveError, SolverConfig};

/// Checks a formula file and returns the solver's primary output lines.
pub trait SolverBackend {
    fn check(&self, formula: &Path) -> Result<Vec<String>, SolveError>;
}

/// Spawns `<command> <args...> <formula>` once per check.
///
/// Diagnostics on stderr are drained by a separate task while stdout is
/// read, so neither pipe can fill up and stall the exchange. The whole
/// exchange is bounded by `timeout`; on expiry the process is killed.
pub struct ProcessBackend {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    runtime: Runtime,
}

impl ProcessBackend {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, SolveError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            command: command.into(),
            args,
            timeout,
            runtime,
        })
    }

    pub fn from_config(config: &SolverConfig) -> Result<Self, SolveError> {
        Self::new(config.command.clone(), config.args.clone(), config.timeout())
    }

    async fn exchange(&self, formula: &Path) -> Result<Vec<String>, SolveError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(formula)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("running solver: {cmd:?}");

        let mut child = cmd.spawn().map_err(|source| SolveError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SolveError::Protocol("solver stdout was not captured".to_string()))?;
        let stderr = child.stderr.take();

        let mut drain = tokio::spawn(async move {
            let Some(stderr) = stderr else {
                return 0usize;
            };
            let mut lines = BufReader::new(stderr).lines();
            let mut count = 0;
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("solver stderr: {line}");
                count += 1;
            }
            count
        });

        let deadline = Instant::now() + self.timeout;
        let result = timeout_at(deadline, async {
            let mut out = Vec::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                debug!("solver: {line}");
                out.push(line);
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((out, status))
        })
        .await;

        let outcome = match result {
            Ok(Ok((lines, status))) => {
                if !status.success() {
                    debug!("solver exited with {status}");
                }
                Ok(lines)
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                Err(SolveError::Io(e))
            }
            Err(_) => {
                warn!("solver timed out after {:?}; killing it", self.timeout);
                let _ = child.kill().await;
                Err(SolveError::Timeout(self.timeout))
            }
        };

        // A surviving grandchild may still hold stderr open; the drain gets
        // whatever is left of the deadline.
        match timeout_at(deadline, &mut drain).await {
            Ok(Ok(n)) if n > 0 => debug!("drained {n} stderr lines"),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("stderr drain task failed: {e}"),
            Err(_) => {
                debug!("stderr still open at the deadline; abandoning it");
                drain.abort();
            }
        }
        outcome
    }
}

impl SolverBackend for ProcessBackend {
    fn check(&self, formula: &Path) -> Result<Vec<String>, SolveError> {
        self.runtime.block_on(self.exchange(formula))
    }
}
