//! Cell model
//!
//! Source text is lexed into [`Line`]s and [`Fenced`] blocks, which are grouped
//! into cells. A cell starts out `Raw`, is classified as `Doc` or `Code`, and is
//! processed exactly once: processing attaches the input/run/output contexts
//! and the parsed tags.

use md5::{Digest, Md5};
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

use super::context::RunContext;
use super::location::Location;
use super::tags::TagsInstances;

/// Prefix of generated (internal) cell names
pub const INTERNAL_NAME_PREFIX: &str = "_";

/// Returns true if `name` is a generated cell name
pub fn is_internal_name(name: &str) -> bool {
    name.starts_with(INTERNAL_NAME_PREFIX)
}

#[derive(Debug, Error, PartialEq)]
pub enum CellError {
    #[error("Cell '{0}' was processed already")]
    AlreadyProcessed(String),
}

/// A single (continuation-merged) source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Index of the first physical line, starting from zero
    pub idx: usize,

    /// Line text, including its line ending
    pub content: String,

    /// Source location of the line (`source` + `idx`)
    pub location: Location,
}

impl Line {
    pub fn new(idx: usize, content: impl Into<String>, source: &Location) -> Self {
        Self {
            idx,
            content: content.into(),
            location: source.child(idx),
        }
    }

    /// Line text without the trailing line ending
    pub fn text(&self) -> &str {
        self.content.trim_end_matches(['\n', '\r'])
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A fenced block; `lines` includes the fence lines themselves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fenced {
    pub idx: usize,
    pub kind: Option<String>,
    pub lines: Vec<Line>,
    /// False when the source ended before the closing fence
    pub closed: bool,
    pub location: Location,
}

impl Fenced {
    pub fn new(
        idx: usize,
        kind: Option<String>,
        lines: Vec<Line>,
        closed: bool,
        source: &Location,
    ) -> Self {
        Self {
            idx,
            kind,
            lines,
            closed,
            location: source.child(idx),
        }
    }

    /// Lines between the fences
    pub fn inner_lines(&self) -> &[Line] {
        let end = if self.closed {
            self.lines.len().saturating_sub(1)
        } else {
            self.lines.len()
        };
        if end <= 1 {
            return &[];
        }
        &self.lines[1..end]
    }
}

/// Item of cell content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Line(Line),
    Fenced(Fenced),
}

impl Block {
    pub fn location(&self) -> &Location {
        match self {
            Block::Line(line) => &line.location,
            Block::Fenced(fenced) => &fenced.location,
        }
    }

    /// All lines of the block in source order
    pub fn lines(&self) -> &[Line] {
        match self {
            Block::Line(line) => std::slice::from_ref(line),
            Block::Fenced(fenced) => &fenced.lines,
        }
    }

    /// True for lines that contain only whitespace
    pub fn is_blank_line(&self) -> bool {
        matches!(self, Block::Line(line) if line.is_blank())
    }
}

/// Cell variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Lexed but not yet classified
    Raw,
    /// Documentation
    Doc,
    /// Directive code block
    Code,
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellKind::Raw => write!(f, "raw"),
            CellKind::Doc => write!(f, "doc"),
            CellKind::Code => write!(f, "code"),
        }
    }
}

/// Contexts attached when a cell is processed
#[derive(Debug, Clone)]
struct Contexts {
    input: RunContext,
    run: RunContext,
    output: RunContext,
}

/// A contiguous unit of document content
#[derive(Debug, Clone)]
pub struct Cell {
    kind: CellKind,
    content: Vec<Block>,
    location: Location,
    name: Option<String>,
    hash: OnceLock<String>,
    contexts: Option<Contexts>,
    tags: Option<TagsInstances>,
    stdout: Vec<String>,
    stderr: Vec<String>,
    result: Option<serde_json::Value>,
}

impl Cell {
    fn with_kind(kind: CellKind, content: Vec<Block>, location: Location) -> Self {
        Self {
            kind,
            content,
            location,
            name: None,
            hash: OnceLock::new(),
            contexts: None,
            tags: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            result: None,
        }
    }

    pub fn raw(content: Vec<Block>, location: Location) -> Self {
        Self::with_kind(CellKind::Raw, content, location)
    }

    pub fn doc(content: Vec<Block>, location: Location) -> Self {
        Self::with_kind(CellKind::Doc, content, location)
    }

    pub fn code(content: Vec<Block>, location: Location) -> Self {
        Self::with_kind(CellKind::Code, content, location)
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn content(&self) -> &[Block] {
        &self.content
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Explicit name, or a generated internal name derived from the location
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}{}", INTERNAL_NAME_PREFIX, self.location),
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// All lines of the cell, fenced blocks flattened
    pub fn flat_lines(&self) -> impl Iterator<Item = &Line> {
        self.content.iter().flat_map(|b| b.lines().iter())
    }

    /// MD5 over the concatenated line text; the name does not take part
    pub fn hash(&self) -> &str {
        self.hash.get_or_init(|| {
            let mut hasher = Md5::new();
            for line in self.flat_lines() {
                hasher.update(line.content.as_bytes());
            }
            format!("{:x}", hasher.finalize())
        })
    }

    /// First fenced block of the cell
    pub fn directive_block(&self) -> Option<&Fenced> {
        self.content.iter().find_map(|b| match b {
            Block::Fenced(fenced) => Some(fenced),
            Block::Line(_) => None,
        })
    }

    pub fn is_processed(&self) -> bool {
        self.contexts.is_some() || self.tags.is_some()
    }

    /// Attaches the entry context and the parsed tags
    ///
    /// Run and output contexts start as copies of the input context.
    pub fn attach(&mut self, input: RunContext, tags: TagsInstances) -> Result<(), CellError> {
        if self.is_processed() {
            return Err(CellError::AlreadyProcessed(self.name()));
        }
        self.contexts = Some(Contexts {
            run: input.clone(),
            output: input.clone(),
            input,
        });
        self.tags = Some(tags);
        Ok(())
    }

    pub fn tags(&self) -> Option<&TagsInstances> {
        self.tags.as_ref()
    }

    pub fn input_context(&self) -> Option<&RunContext> {
        self.contexts.as_ref().map(|c| &c.input)
    }

    pub fn run_context(&self) -> Option<&RunContext> {
        self.contexts.as_ref().map(|c| &c.run)
    }

    pub fn run_context_mut(&mut self) -> Option<&mut RunContext> {
        self.contexts.as_mut().map(|c| &mut c.run)
    }

    pub fn output_context(&self) -> Option<&RunContext> {
        self.contexts.as_ref().map(|c| &c.output)
    }

    /// Both the run and the output context, for publishing
    pub fn run_and_output_mut(&mut self) -> Option<(&RunContext, &mut RunContext)> {
        self.contexts.as_mut().map(|c| (&c.run, &mut c.output))
    }

    pub fn stdout(&self) -> &[String] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[String] {
        &self.stderr
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    /// Accumulates runner output; a later value replaces an earlier one
    pub fn record_output(
        &mut self,
        stdout: Vec<String>,
        stderr: Vec<String>,
        value: Option<serde_json::Value>,
    ) {
        self.stdout.extend(stdout);
        self.stderr.extend(stderr);
        if value.is_some() {
            self.result = value;
        }
    }
}

/// Ordered stream of cells
#[derive(Debug, Clone, Default)]
pub struct CellsStream {
    cells: Vec<Cell>,
}

impl CellsStream {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Location {
        Location::named("doc.md")
    }

    fn doc_cell(lines: &[&str]) -> Cell {
        let src = source();
        let content = lines
            .iter()
            .enumerate()
            .map(|(i, l)| Block::Line(Line::new(i, *l, &src)))
            .collect();
        Cell::doc(content, src.child(0usize))
    }

    #[test]
    fn hash_is_stable() {
        let cell = doc_cell(&["a\n", "b\n"]);
        let first = cell.hash().to_string();
        assert_eq!(cell.hash(), first);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn hash_ignores_name() {
        let cell = doc_cell(&["a\n", "b\n"]);
        let mut named = cell.clone();
        named.set_name("other");
        assert_eq!(cell.hash(), named.hash());
    }

    #[test]
    fn hash_follows_content() {
        let a = doc_cell(&["a\n", "b\n"]);
        let b = doc_cell(&["a\n", "c\n"]);
        assert_ne!(a.hash(), b.hash());
    }

    proptest::proptest! {
        #[test]
        fn hash_covers_concatenated_text(lines in proptest::collection::vec("[a-z ]{0,8}\n", 1..6)) {
            let split: Vec<&str> = lines.iter().map(String::as_str).collect();
            let joined = lines.concat();
            let a = doc_cell(&split);
            let b = doc_cell(&[joined.as_str()]);
            proptest::prop_assert_eq!(a.hash(), b.hash());
            let a_clone = a.clone();
            proptest::prop_assert_eq!(a.hash(), a_clone.hash());
        }
    }

    #[test]
    fn generated_name_is_internal() {
        let cell = doc_cell(&["a\n"]);
        assert_eq!(cell.name(), "_doc.md:0");
        assert!(is_internal_name(&cell.name()));

        let mut named = cell;
        named.set_name("intro");
        assert_eq!(named.name(), "intro");
        assert!(!is_internal_name("intro"));
    }

    #[test]
    fn attach_twice_fails() {
        let mut cell = doc_cell(&["a\n"]);
        cell.attach(RunContext::default(), TagsInstances::default())
            .unwrap();
        assert!(cell.is_processed());

        let err = cell
            .attach(RunContext::default(), TagsInstances::default())
            .unwrap_err();
        assert_eq!(err, CellError::AlreadyProcessed("_doc.md:0".to_string()));
    }

    #[test]
    fn fenced_inner_lines_skip_fences() {
        let src = source();
        let lines = vec![
            Line::new(0, "```vdf\n", &src),
            Line::new(1, "#code\n", &src),
            Line::new(2, "x;\n", &src),
            Line::new(3, "```\n", &src),
        ];
        let closed = Fenced::new(0, Some("vdf".into()), lines.clone(), true, &src);
        assert_eq!(closed.inner_lines().len(), 2);

        let open = Fenced::new(0, Some("vdf".into()), lines[..3].to_vec(), false, &src);
        assert_eq!(open.inner_lines().len(), 2);
        assert_eq!(open.inner_lines()[1].text(), "x;");
    }
}
