//! Source loading

use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::format::{SourceFormat, SourceFormats};
use super::SourceError;
use crate::domain::Location;

/// Text source split into physical lines, line endings kept
#[derive(Debug, Clone)]
pub struct SourceText {
    name: String,
    format: Arc<SourceFormat>,
    lines: Vec<String>,
}

impl SourceText {
    pub fn from_str(name: impl Into<String>, text: &str, format: Arc<SourceFormat>) -> Self {
        Self {
            name: name.into(),
            format,
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &SourceFormat {
        &self.format
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Root location of every line in this source
    pub fn location(&self) -> Location {
        Location::named(self.name.clone())
    }
}

/// A loaded source
#[derive(Debug, Clone)]
pub enum Source {
    Text(SourceText),
    /// Binary sources are kept aside and never lexed
    Binary {
        name: String,
        format: Arc<SourceFormat>,
        size: usize,
    },
}

impl Source {
    pub fn name(&self) -> &str {
        match self {
            Source::Text(text) => text.name(),
            Source::Binary { name, .. } => name,
        }
    }

    pub fn into_text(self) -> Result<SourceText, SourceError> {
        match self {
            Source::Text(text) => Ok(text),
            Source::Binary { name, .. } => Err(SourceError::Binary { path: name }),
        }
    }
}

/// Loads a source file, picking the format by suffix
///
/// Text is decoded as UTF-8 and `\r\n` line endings are normalized to `\n`.
pub fn load_from_file(path: &Path, formats: &SourceFormats) -> Result<Source, SourceError> {
    let format = formats.for_path(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let data = fs::read(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })?;

    if format.is_binary() {
        return Ok(Source::Binary {
            name,
            format,
            size: data.len(),
        });
    }

    let text = String::from_utf8(data).map_err(|_| SourceError::Decode {
        path: path.display().to_string(),
    })?;
    let text = text.replace("\r\n", "\n");
    Ok(Source::Text(SourceText::from_str(name, &text, format)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::format::{FormatKind, DEFAULT_FENCE_PATTERN};
    use regex::Regex;
    use tempfile::TempDir;

    fn formats() -> SourceFormats {
        let mut formats = SourceFormats::new();
        let mut md = SourceFormat::new("markdown", Regex::new(DEFAULT_FENCE_PATTERN).unwrap());
        md.ext = vec![".md".into()];
        formats.insert(md);
        let mut png = SourceFormat::new("image", Regex::new(DEFAULT_FENCE_PATTERN).unwrap());
        png.kind = FormatKind::Binary;
        png.ext = vec![".png".into()];
        formats.insert(png);
        formats
    }

    #[test]
    fn from_str_keeps_line_endings() {
        let fmts = formats();
        let text = SourceText::from_str("doc.md", "a\nb\nc", fmts.get("markdown").unwrap());
        assert_eq!(text.lines(), ["a\n", "b\n", "c"]);
        assert_eq!(text.location().to_string(), "doc.md");
    }

    #[test]
    fn load_normalizes_crlf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.md");
        fs::write(&path, "a\r\nb\r\n").unwrap();

        let source = load_from_file(&path, &formats()).unwrap();
        let text = source.into_text().unwrap();
        assert_eq!(text.name(), "doc.md");
        assert_eq!(text.lines(), ["a\n", "b\n"]);
    }

    #[test]
    fn binary_sources_are_not_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wave.png");
        fs::write(&path, [0u8, 159, 146, 150]).unwrap();

        let source = load_from_file(&path, &formats()).unwrap();
        assert!(matches!(source, Source::Binary { size: 4, .. }));
        assert!(matches!(source.into_text(), Err(SourceError::Binary { .. })));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.md");
        fs::write(&path, [0xffu8, 0xfe]).unwrap();
        assert!(matches!(
            load_from_file(&path, &formats()),
            Err(SourceError::Decode { .. })
        ));
    }
}
