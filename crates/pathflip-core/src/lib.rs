//! Concolic exploration driver: configuration, the iteration loop, and the
//! glue to an external instrumented program.

pub mod config;
pub mod history_store;
pub mod limits;
pub mod report;
pub mod runner;
pub mod session;

pub use config::{ConfigError, ExplorerConfig};
pub use limits::{ResourceLimits, StopReason};
pub use report::ExplorationReport;
pub use runner::{ProgramRunner, RunError, TraceCommandRunner};
pub use session::{ExplorationSession, SessionError};
