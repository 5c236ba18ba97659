//! Session-wide string interning.
//!
//! String literals inside constraints are stored as [`StrId`]s so that
//! constraints stay cheap to clone and compare. The table only ever grows,
//! and a given string always maps to the same id for the lifetime of the
//! table.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Handle to an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrId(pub u32);

#[derive(Debug, Clone, Default)]
pub struct StringTable {
    ids: HashMap<String, StrId>,
    strings: Vec<String>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `s`, allocating the next one on first sight.
    pub fn intern(&mut self, s: &str) -> StrId {
        if let Some(id) = self.ids.get(s) {
            return *id;
        }
        let id = StrId(self.strings.len() as u32);
        self.ids.insert(s.to_string(), id);
        self.strings.push(s.to_string());
        id
    }

    pub fn lookup(&self, s: &str) -> Option<StrId> {
        self.ids.get(s).copied()
    }

    pub fn resolve(&self, id: StrId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(String::as_str)
    }

    /// Like [`resolve`](Self::resolve), but unknown ids render as `string<N>`.
    pub fn text(&self, id: StrId) -> Cow<'_, str> {
        match self.resolve(id) {
            Some(s) => Cow::Borrowed(s),
            None => Cow::Owned(format!("string{}", id.0)),
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
