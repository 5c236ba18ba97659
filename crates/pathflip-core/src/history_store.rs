//! The replay prefix saved between iterations.
use std::fs;
use std::io;
use std::path::PathBuf;

use log::debug;

use pathflip_explore::PathElement;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt history file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The saved prefix; empty when nothing is saved.
    pub fn load(&self) -> Result<Vec<PathElement>, HistoryError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, prefix: &[PathElement]) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(prefix)?;
        fs::write(&self.path, json)?;
        debug!("saved {} history elements to {}", prefix.len(), self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), HistoryError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathflip_explore::{BranchElement, ScopeEdge};

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        assert!(store.load().unwrap().is_empty());

        let prefix = vec![
            PathElement::Scope {
                edge: ScopeEdge::Begin,
            },
            PathElement::Branch(BranchElement::new(false, Some(0), 9)),
        ];
        store.save(&prefix).unwrap();
        assert_eq!(store.load().unwrap(), prefix);

        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
        store.clear().unwrap();
    }
}
