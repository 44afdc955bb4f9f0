//! Output files
//!
//! A [`File`] stores generated lines per section and subsection. Sections come
//! from the file kind's [`FileSpec`], plus the implicit `raw` section which
//! holds unstructured content. A file is either raw or structured, never both.

use im::{OrdMap, Vector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::context::{RunContext, Vars};
use super::location::Location;
use super::render::{self, RenderError, RenderedLine};

/// Implicit unstructured section present in every file
pub const RAW_SECTION: &str = "raw";

/// Storage key of the default subsection
pub const DEFAULT_SUBSECTION: &str = "_default_";

/// Sentinel name addressing every subsection of a section at once
pub const ALL_SUBSECTION: &str = "_all_";

#[derive(Debug, Error, PartialEq)]
pub enum FileError {
    #[error("No section '{section}' in file '{path}'")]
    UnknownSection { section: String, path: String },

    #[error("File '{path}' has structured sections already, mixing them with '{RAW_SECTION}' is not allowed")]
    RawAfterStructured { path: String },

    #[error("File '{path}' has '{RAW_SECTION}' content already, mixing it with other sections is not allowed")]
    StructuredAfterRaw { path: String },

    #[error("Append is not allowed with subsection '{ALL_SUBSECTION}' (section '{section}')")]
    AppendToAll { section: String },

    #[error("Only the '{RAW_SECTION}' section can be changed in external file '{path}' (got '{section}')")]
    OuterFileSection { section: String, path: String },

    #[error("No spec for file kind '{0}'")]
    UnknownKind(String),
}

/// Renderer selection for a file kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Renderer {
    /// Renders the kind's template
    #[default]
    Template,
    /// Emits the raw section verbatim
    Passthrough,
}

/// Static per-kind file configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FileSpec {
    pub kind: String,
    pub renderer: Renderer,
    pub ext: String,
    /// Declared sections, `raw` first
    pub sections: Vec<String>,
    pub template: String,
    /// Language whose default target is this kind
    pub language: Option<String>,
}

impl FileSpec {
    pub fn new(
        kind: impl Into<String>,
        renderer: Renderer,
        ext: impl Into<String>,
        sections: Vec<String>,
        template: impl Into<String>,
    ) -> Self {
        let mut all = vec![RAW_SECTION.to_string()];
        all.extend(sections.into_iter().filter(|s| s != RAW_SECTION));
        Self {
            kind: kind.into(),
            renderer,
            ext: ext.into(),
            sections: all,
            template: template.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.iter().any(|s| s == section)
    }
}

/// File-kind table
#[derive(Debug, Clone, Default)]
pub struct FileSpecs {
    specs: BTreeMap<String, Arc<FileSpec>>,
}

impl FileSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: FileSpec) {
        self.specs.insert(spec.kind.clone(), Arc::new(spec));
    }

    pub fn get(&self, kind: &str) -> Result<Arc<FileSpec>, FileError> {
        self.specs
            .get(kind)
            .cloned()
            .ok_or_else(|| FileError::UnknownKind(kind.to_string()))
    }

    /// Kind for a file suffix such as `.vhd`; kinds bound to a language win
    pub fn for_ext(&self, ext: &str) -> Option<Arc<FileSpec>> {
        let mut matching = self.specs.values().filter(|s| s.ext == ext);
        let first = matching.next()?;
        if first.language.is_some() {
            return Some(Arc::clone(first));
        }
        Some(Arc::clone(
            matching.find(|s| s.language.is_some()).unwrap_or(first),
        ))
    }

    /// Default file kind for a language
    pub fn for_language(&self, language: &str) -> Option<Arc<FileSpec>> {
        self.specs
            .values()
            .find(|s| s.language.as_deref() == Some(language))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FileSpec>> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// A line of generated content with the chain of locations it came from
#[derive(Clone)]
pub struct GeneratedLine {
    content: String,
    provenance: Vec<Location>,
    context: Arc<RunContext>,
}

impl GeneratedLine {
    pub fn new(
        content: impl Into<String>,
        provenance: Vec<Location>,
        context: Arc<RunContext>,
    ) -> Self {
        Self {
            content: content.into(),
            provenance,
            context,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn provenance(&self) -> &[Location] {
        &self.provenance
    }

    /// Context active when the line was produced
    pub fn context(&self) -> &RunContext {
        &self.context
    }
}

impl fmt::Debug for GeneratedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedLine")
            .field("content", &self.content)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

/// Subsection address for [`File::modify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subsection {
    Default,
    /// Every subsection; only valid when replacing
    All,
    Named(String),
}

impl Subsection {
    fn key(&self) -> &str {
        match self {
            Subsection::Default | Subsection::All => DEFAULT_SUBSECTION,
            Subsection::Named(name) => name,
        }
    }
}

impl From<&str> for Subsection {
    fn from(name: &str) -> Self {
        match name {
            "" | DEFAULT_SUBSECTION => Subsection::Default,
            ALL_SUBSECTION => Subsection::All,
            other => Subsection::Named(other.to_string()),
        }
    }
}

/// Where a file's content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOrigin {
    /// Constructed section by section
    Inner,
    /// Loaded externally; only the raw section may change
    Outer,
}

type SectionData = OrdMap<String, Vector<GeneratedLine>>;

/// Current state of an output file
#[derive(Debug, Clone)]
pub struct File {
    name: String,
    spec: Arc<FileSpec>,
    origin: FileOrigin,
    eol: String,
    sections: OrdMap<String, SectionData>,
    vars: Vars,
}

impl File {
    pub fn new(name: impl Into<String>, spec: Arc<FileSpec>) -> Self {
        Self::with_origin(name, spec, FileOrigin::Inner)
    }

    pub fn outer(name: impl Into<String>, spec: Arc<FileSpec>) -> Self {
        Self::with_origin(name, spec, FileOrigin::Outer)
    }

    fn with_origin(name: impl Into<String>, spec: Arc<FileSpec>, origin: FileOrigin) -> Self {
        Self {
            name: name.into(),
            spec,
            origin,
            eol: "\n".to_string(),
            sections: OrdMap::new(),
            vars: Vars::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name plus the kind's extension
    pub fn path(&self) -> String {
        format!("{}{}", self.name, self.spec.ext)
    }

    pub fn kind(&self) -> &str {
        &self.spec.kind
    }

    pub fn spec(&self) -> &FileSpec {
        &self.spec
    }

    pub fn origin(&self) -> FileOrigin {
        self.origin
    }

    pub fn eol(&self) -> &str {
        &self.eol
    }

    pub fn set_eol(&mut self, eol: impl Into<String>) {
        self.eol = eol.into();
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.set(name, value);
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    fn has_raw_content(&self) -> bool {
        self.sections
            .get(RAW_SECTION)
            .is_some_and(|subs| subs.values().any(|lines| !lines.is_empty()))
    }

    fn has_structured_content(&self) -> bool {
        self.sections
            .iter()
            .filter(|(name, _)| name.as_str() != RAW_SECTION)
            .any(|(_, subs)| subs.values().any(|lines| !lines.is_empty()))
    }

    /// True when the file only has raw content
    pub fn is_raw_only(&self) -> bool {
        self.has_raw_content()
    }

    /// Writes lines into a section
    ///
    /// The raw section always uses the default subsection. [`Subsection::All`]
    /// clears the section first and requires `append == false`.
    pub fn modify(
        &mut self,
        section: &str,
        lines: Vec<GeneratedLine>,
        subsection: Subsection,
        append: bool,
    ) -> Result<(), FileError> {
        if !self.spec.has_section(section) {
            return Err(FileError::UnknownSection {
                section: section.to_string(),
                path: self.path(),
            });
        }
        if self.origin == FileOrigin::Outer && section != RAW_SECTION {
            return Err(FileError::OuterFileSection {
                section: section.to_string(),
                path: self.path(),
            });
        }

        let subsection = if section == RAW_SECTION {
            if self.has_structured_content() {
                return Err(FileError::RawAfterStructured { path: self.path() });
            }
            Subsection::Default
        } else {
            if self.has_raw_content() {
                return Err(FileError::StructuredAfterRaw { path: self.path() });
            }
            subsection
        };

        if subsection == Subsection::All && append {
            return Err(FileError::AppendToAll {
                section: section.to_string(),
            });
        }

        let mut data = match subsection {
            Subsection::All => SectionData::new(),
            _ => self.sections.get(section).cloned().unwrap_or_default(),
        };
        let key = subsection.key().to_string();
        let mut target = if append {
            data.get(&key).cloned().unwrap_or_default()
        } else {
            Vector::new()
        };
        target.extend(lines);
        data.insert(key, target);
        self.sections.insert(section.to_string(), data);
        Ok(())
    }

    /// Lines of one section, default subsection first, others by name
    pub fn section_lines(&self, section: &str) -> Vec<GeneratedLine> {
        let Some(subs) = self.sections.get(section) else {
            return Vec::new();
        };
        let mut result: Vec<GeneratedLine> = subs
            .get(DEFAULT_SUBSECTION)
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default();
        for (name, lines) in subs.iter() {
            if name != DEFAULT_SUBSECTION {
                result.extend(lines.iter().cloned());
            }
        }
        result
    }

    /// Renders the file against a document context
    pub fn render(&self, context: &RunContext) -> Result<Vec<RenderedLine>, RenderError> {
        render::render_file(self, context)
    }

    /// Final lines plus one provenance record per line
    pub fn saves(&self, context: &RunContext) -> Result<(Vec<String>, Vec<String>), RenderError> {
        let rendered = self.render(context)?;
        render::finalize(&rendered)
    }
}

/// Output file registry, in creation order
#[derive(Debug, Clone, Default)]
pub struct Files(Vector<File>);

impl Files {
    pub fn new() -> Self {
        Self(Vector::new())
    }

    pub fn get(&self, path: &str) -> Option<&File> {
        self.0.iter().find(|f| f.path() == path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut File> {
        let idx = self.0.iter().position(|f| f.path() == path)?;
        self.0.get_mut(idx)
    }

    /// Replaces the file with the same path, or registers it at the end
    pub fn upsert(&mut self, file: File) {
        let path = file.path();
        match self.0.iter().position(|f| f.path() == path) {
            Some(idx) => {
                self.0.set(idx, file);
            }
            None => self.0.push_back(file),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &File> {
        self.0.iter()
    }

    pub fn paths(&self) -> Vec<String> {
        self.0.iter().map(File::path).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> Arc<FileSpec> {
        Arc::new(FileSpec::new(
            "vhdl",
            Renderer::Template,
            ".vhd",
            vec!["header".into(), "content".into()],
            "{{ render_section('content') }}",
        ))
    }

    fn lines(texts: &[&str]) -> Vec<GeneratedLine> {
        let ctx = Arc::new(RunContext::default());
        texts
            .iter()
            .map(|t| GeneratedLine::new(*t, vec![Location::named("doc.md")], Arc::clone(&ctx)))
            .collect()
    }

    fn contents(file: &File, section: &str) -> Vec<String> {
        file.section_lines(section)
            .iter()
            .map(|l| l.content().to_string())
            .collect()
    }

    #[test]
    fn path_uses_extension() {
        let file = File::new("main", spec());
        assert_eq!(file.path(), "main.vhd");
        assert_eq!(file.kind(), "vhdl");
    }

    #[test]
    fn unknown_section_is_rejected() {
        let mut file = File::new("main", spec());
        let err = file
            .modify("bogus", lines(&["x"]), Subsection::Default, true)
            .unwrap_err();
        assert!(matches!(err, FileError::UnknownSection { .. }));
    }

    #[test]
    fn raw_after_structured_fails() {
        let mut file = File::new("main", spec());
        file.modify("content", lines(&["a"]), Subsection::Default, true)
            .unwrap();
        let err = file
            .modify(RAW_SECTION, lines(&["b"]), Subsection::Default, true)
            .unwrap_err();
        assert_eq!(err, FileError::RawAfterStructured { path: "main.vhd".into() });
    }

    #[test]
    fn structured_after_raw_fails() {
        let mut file = File::new("main", spec());
        file.modify(RAW_SECTION, lines(&["a"]), Subsection::Default, true)
            .unwrap();
        let err = file
            .modify("header", lines(&["b"]), Subsection::Default, true)
            .unwrap_err();
        assert_eq!(err, FileError::StructuredAfterRaw { path: "main.vhd".into() });
        assert!(file.is_raw_only());
    }

    #[test]
    fn append_to_all_fails() {
        let mut file = File::new("main", spec());
        let err = file
            .modify("content", lines(&["a"]), Subsection::All, true)
            .unwrap_err();
        assert!(matches!(err, FileError::AppendToAll { .. }));
    }

    #[test]
    fn subsections_flatten_default_first() {
        let mut file = File::new("main", spec());
        file.modify("content", lines(&["z"]), Subsection::Named("zeta".into()), true)
            .unwrap();
        file.modify("content", lines(&["a"]), Subsection::Named("alpha".into()), true)
            .unwrap();
        file.modify("content", lines(&["d"]), Subsection::Default, true)
            .unwrap();

        assert_eq!(contents(&file, "content"), vec!["d", "a", "z"]);
    }

    #[test]
    fn append_and_replace() {
        let mut file = File::new("main", spec());
        file.modify("content", lines(&["a"]), Subsection::Default, true)
            .unwrap();
        file.modify("content", lines(&["b"]), Subsection::Default, true)
            .unwrap();
        assert_eq!(contents(&file, "content"), vec!["a", "b"]);

        file.modify("content", lines(&["c"]), Subsection::Default, false)
            .unwrap();
        assert_eq!(contents(&file, "content"), vec!["c"]);
    }

    #[test]
    fn replace_all_clears_every_subsection() {
        let mut file = File::new("main", spec());
        file.modify("content", lines(&["a"]), Subsection::Named("one".into()), true)
            .unwrap();
        file.modify("content", lines(&["b"]), Subsection::Named("two".into()), true)
            .unwrap();
        file.modify("content", lines(&["c"]), Subsection::All, false)
            .unwrap();
        assert_eq!(contents(&file, "content"), vec!["c"]);
    }

    #[test]
    fn outer_file_only_accepts_raw() {
        let mut file = File::outer("vendor", spec());
        let err = file
            .modify("content", lines(&["a"]), Subsection::Default, true)
            .unwrap_err();
        assert!(matches!(err, FileError::OuterFileSection { .. }));
        file.modify(RAW_SECTION, lines(&["a"]), Subsection::Named("ignored".into()), true)
            .unwrap();
        assert_eq!(contents(&file, RAW_SECTION), vec!["a"]);
    }

    #[test]
    fn copies_do_not_share_sections() {
        let mut file = File::new("main", spec());
        file.modify("content", lines(&["a"]), Subsection::Default, true)
            .unwrap();
        let snapshot = file.clone();
        file.modify("content", lines(&["b"]), Subsection::Default, true)
            .unwrap();
        assert_eq!(contents(&snapshot, "content"), vec!["a"]);
        assert_eq!(contents(&file, "content"), vec!["a", "b"]);
    }

    #[test]
    fn subsection_from_str() {
        assert_eq!(Subsection::from(""), Subsection::Default);
        assert_eq!(Subsection::from(DEFAULT_SUBSECTION), Subsection::Default);
        assert_eq!(Subsection::from(ALL_SUBSECTION), Subsection::All);
        assert_eq!(Subsection::from("cell"), Subsection::Named("cell".into()));
    }

    #[test]
    fn files_upsert_replaces_by_path() {
        let mut files = Files::new();
        files.upsert(File::new("main", spec()));
        files.upsert(File::new("top", spec()));

        let mut changed = File::new("main", spec());
        changed.set_var("subject", "changed");
        files.upsert(changed);

        assert_eq!(files.paths(), vec!["main.vhd", "top.vhd"]);
        assert_eq!(files.len(), 2);
    }
}
