//! Exploration report.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pathflip_explore::SolveStats;

use crate::limits::StopReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationReport {
    /// Concrete runs executed.
    pub iterations: u64,
    pub stop_reason: StopReason,
    pub stats: SolveStats,
    /// Input lines each run was executed with, in order.
    pub inputs: Vec<Vec<String>>,
    /// Wall-clock elapsed seconds.
    pub elapsed_secs: f64,
}

impl ExplorationReport {
    /// Distinct input sets, first occurrence order.
    pub fn distinct_inputs(&self) -> Vec<&[String]> {
        let mut seen: Vec<&[String]> = Vec::new();
        for input in &self.inputs {
            if !seen.contains(&input.as_slice()) {
                seen.push(input);
            }
        }
        seen
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}
