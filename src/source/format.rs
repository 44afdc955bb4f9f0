//! Source formats
//!
//! A format tells the lexer how to read one kind of source file: its escape
//! symbol, how fenced blocks open and close, which line sequence splits cells
//! and whether a frontmatter cell is recognized.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::escape::DEFAULT_ESCAPE;
use super::SourceError;

/// Fence opening used when a format does not declare one
pub const DEFAULT_FENCE: &str = "```";

/// Captures the closing sequence (group 1) and the block kind (group 2)
pub const DEFAULT_FENCE_PATTERN: &str = r"^(`{3,})\s*([^\s`]*)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    #[default]
    Text,
    Binary,
}

#[derive(Debug, Clone)]
pub struct SourceFormat {
    pub name: String,
    pub kind: FormatKind,
    /// File suffixes, dot included
    pub ext: Vec<String>,
    pub escape: char,
    pub fence: String,
    pub fence_regex: Regex,
    /// Stripped lines that separate cells
    pub cells_split: Vec<String>,
    pub frontmatter: bool,
}

impl SourceFormat {
    pub fn new(name: impl Into<String>, fence_regex: Regex) -> Self {
        Self {
            name: name.into(),
            kind: FormatKind::Text,
            ext: Vec::new(),
            escape: DEFAULT_ESCAPE,
            fence: DEFAULT_FENCE.to_string(),
            fence_regex,
            cells_split: Vec::new(),
            frontmatter: false,
        }
    }

    /// Opening check on a stripped line: `(closing sequence, kind)`
    pub fn fence_check(&self, stripped: &str) -> Option<(String, Option<String>)> {
        if !stripped.starts_with(&self.fence) {
            return None;
        }
        let caps = self.fence_regex.captures(stripped)?;
        let closing = caps.get(1)?.as_str().to_string();
        let kind = caps
            .get(2)
            .map(|m| m.as_str())
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        Some((closing, kind))
    }

    pub fn is_binary(&self) -> bool {
        self.kind == FormatKind::Binary
    }
}

/// Format table, keyed by format name
#[derive(Debug, Clone, Default)]
pub struct SourceFormats {
    formats: BTreeMap<String, Arc<SourceFormat>>,
}

impl SourceFormats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, format: SourceFormat) {
        self.formats.insert(format.name.clone(), Arc::new(format));
    }

    pub fn get(&self, name: &str) -> Option<Arc<SourceFormat>> {
        self.formats.get(name).cloned()
    }

    /// Format owning the path's suffix
    pub fn for_path(&self, path: &Path) -> Result<Arc<SourceFormat>, SourceError> {
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        self.formats
            .values()
            .find(|f| f.ext.iter().any(|e| *e == suffix))
            .cloned()
            .ok_or_else(|| SourceError::UnknownFormat {
                path: path.display().to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceFormat>> {
        self.formats.values()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
