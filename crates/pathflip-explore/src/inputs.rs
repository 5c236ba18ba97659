//! The concrete input file.
//!
//! One line per requested input, in request order, with scope markers as
//! their own lines. After a successful solve the file is rewritten from the
//! run's input records: solved values where the solution has them, the
//! previous values otherwise.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use pathflip_ir::{SolutionMap, VarId};

/// Value an input had during the run that recorded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcreteValue {
    Int(i32),
    Long(i64),
    Float(f64),
    /// A string input; `length` is the variable holding its length.
    Str { text: String, length: VarId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRecord {
    ScopeBegin,
    ScopeEnd,
    Value { symbol: VarId, value: ConcreteValue },
}

/// Tokens and filler used when reading and writing the input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputFormat {
    pub scope_begin_marker: String,
    pub scope_end_marker: String,
    /// Filler for string positions with neither a solved nor a previous
    /// character.
    pub default_char: char,
}

impl Default for InputFormat {
    fn default() -> Self {
        Self {
            scope_begin_marker: "[".to_string(),
            scope_end_marker: "]".to_string(),
            default_char: 'a',
        }
    }
}

/// Location and format of the concrete input file.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    pub format: InputFormat,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, format: InputFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Lines of the file; a missing file is an empty input stream.
    pub fn read_lines(&self) -> io::Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Replace the file with `lines`. The previous contents are kept at
    /// `<path>.bak`; the new contents land through a rename so a reader
    /// never sees a half-written file.
    pub fn write_lines(&self, lines: &[String]) -> io::Result<()> {
        if self.path.exists() {
            fs::copy(&self.path, sibling(&self.path, "bak"))?;
        }
        let tmp = sibling(&self.path, "tmp");
        let mut text = lines.join("\n");
        text.push('\n');
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        debug!("wrote {} input lines to {}", lines.len(), self.path.display());
        Ok(())
    }
}

fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Input lines for the next run.
pub fn materialize(records: &[InputRecord], soln: &SolutionMap, format: &InputFormat) -> Vec<String> {
    records
        .iter()
        .map(|record| match record {
            InputRecord::ScopeBegin => format.scope_begin_marker.clone(),
            InputRecord::ScopeEnd => format.scope_end_marker.clone(),
            InputRecord::Value { symbol, value } => match soln.int(*symbol) {
                Some(solved) => solved.to_string(),
                None => previous_or_solved_string(*symbol, value, soln, format.default_char),
            },
        })
        .collect()
}

fn previous_or_solved_string(
    symbol: VarId,
    value: &ConcreteValue,
    soln: &SolutionMap,
    filler: char,
) -> String {
    match value {
        ConcreteValue::Int(v) => v.to_string(),
        ConcreteValue::Long(v) => v.to_string(),
        ConcreteValue::Float(v) => v.to_string(),
        ConcreteValue::Str { text, length } => {
            let old: Vec<char> = text.chars().collect();
            let len = soln
                .int(*length)
                .map_or(old.len(), |l| usize::try_from(l).unwrap_or(0));
            (0..len)
                .map(|i| {
                    soln.char_code(symbol, i as u32)
                        .and_then(|code| u32::try_from(code).ok())
                        .and_then(char::from_u32)
                        .or_else(|| old.get(i).copied())
                        .unwrap_or(filler)
                })
                .collect()
        }
    }
}
