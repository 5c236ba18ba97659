//! Resource limits for an exploration session.
//!
//! When a limit is hit the session stops and still reports what it found.

use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum concrete runs.
    pub max_iterations: u64,
    /// Maximum wall-clock seconds before forced stop.
    pub max_wall_secs: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_iterations: 1_000,
            max_wall_secs: 3_600, // 1 hour
        }
    }
}

/// Why an exploration session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No unexplored feasible branch remains.
    Exhausted,
    IterationLimitExceeded,
    WallTimeExceeded,
}

pub struct ResourceChecker {
    limits: ResourceLimits,
    start_time: Instant,
}

impl ResourceChecker {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
        }
    }

    /// `None` while every limit holds.
    pub fn check(&self, iterations: u64) -> Option<StopReason> {
        if iterations >= self.limits.max_iterations {
            return Some(StopReason::IterationLimitExceeded);
        }
        if self.start_time.elapsed().as_secs() >= self.limits.max_wall_secs {
            return Some(StopReason::WallTimeExceeded);
        }
        None
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
