//! Explorer configuration.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pathflip_explore::{InputFile, InputFormat, SolverConfig};

use crate::limits::ResourceLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything an exploration session needs to know.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub solver: SolverConfig,
    /// Concrete input file read by the program under test.
    pub inputs_file: PathBuf,
    /// Replay prefix handed from one iteration to the next.
    pub history_file: PathBuf,
    /// Where to write the final report, if anywhere.
    pub report_file: Option<PathBuf>,
    pub max_string_length: i64,
    #[serde(flatten)]
    pub input_format: InputFormat,
    pub limits: ResourceLimits,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            inputs_file: PathBuf::from("inputs"),
            history_file: PathBuf::from("history.json"),
            report_file: None,
            max_string_length: 100,
            input_format: InputFormat::default(),
            limits: ResourceLimits::default(),
        }
    }
}

impl ExplorerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solver.command.trim().is_empty() {
            return Err(ConfigError::Invalid("solver.command is empty".to_string()));
        }
        if self.solver.retry_budget == 0 {
            return Err(ConfigError::Invalid("solver.retry_budget must be at least 1".to_string()));
        }
        if self.max_string_length < 0 {
            return Err(ConfigError::Invalid(format!(
                "max_string_length must not be negative, got {}",
                self.max_string_length
            )));
        }
        let f = &self.input_format;
        if f.scope_begin_marker == f.scope_end_marker {
            return Err(ConfigError::Invalid(
                "scope begin and end markers must differ".to_string(),
            ));
        }
        if f.default_char.is_control() {
            return Err(ConfigError::Invalid("default_char must be printable".to_string()));
        }
        Ok(())
    }

    pub fn input_file(&self) -> InputFile {
        InputFile::new(self.inputs_file.clone(), self.input_format.clone())
    }
}
