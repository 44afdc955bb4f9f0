//! # Processor
//!
//! Drives cells through the tag runners and records the results in the
//! document history.
//!
//! ## Routing
//!
//! | Tags on the cell              | Branch                     | Parent episode            |
//! |-------------------------------|----------------------------|---------------------------|
//! | none                          | default                    | default branch tip        |
//! | `#parent`                     | parent's branch            | named episode             |
//! | `#parent` (not a branch tip)  | new branch named after cell| named episode             |
//! | `#branch`                     | named branch               | branch tip, else default tip or `#parent` |
//!
//! Appending to a non-empty branch from anything but its tip is an error.

pub mod frontmatter;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{
    Block, Cell, CellError, CellKind, Document, DocumentError, EpisodeRef, Fenced, Line, Location,
    Phase, RunContext, TagError, TagsInstances,
};
use crate::domain::document::Episode;
use crate::domain::tags::{TagDefs, DIRECTIVE_KIND};
use crate::runner::code::{ATTR_LANGUAGE, DEFAULT_LANGUAGE};
use crate::runner::{collect_defaults, RunnerError};
use crate::source::lexer::{self, is_directive};
use crate::source::{SourceError, SourceText};
use crate::storage::{tag_defs_from_value, Catalog, ConfigError};

pub use frontmatter::Frontmatter;

/// Source name of ad-hoc notebook cells
pub const NOTEBOOK_SOURCE: &str = "notebook";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Cell(#[from] CellError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Malformed frontmatter: {0}")]
    Frontmatter(#[from] serde_yaml::Error),

    #[error("Code cell '{0}' has no directive block")]
    NotDirective(String),

    #[error("Cell name '{0}' is already used")]
    DuplicateName(String),

    #[error("Cell '{cell}' names unknown parent '{parent}'")]
    UnknownParent { cell: String, parent: String },

    #[error("Branch '{branch}' continues from {tip}, not from {parent}")]
    BranchParentMismatch {
        branch: String,
        tip: String,
        parent: String,
    },

    #[error("Frontmatter sets unknown attribute '{0}'")]
    UnknownAttribute(String),
}

/// Input of [`Processor::process_cell`]
#[derive(Debug, Clone)]
pub enum CellInput {
    /// A cell from the lexer
    Cell(Cell),
    /// Ad-hoc notebook input: the directive line and the code below it
    Text { first_line: String, body: String },
}

/// One step of [`Processor::process_doc`]
#[derive(Debug, Clone)]
pub struct Stage {
    /// Document right after the cell was processed
    pub document: Document,
    pub location: Location,
    pub cell: Arc<Cell>,
}

/// Runs documents against a catalog
#[derive(Debug, Clone)]
pub struct Processor {
    catalog: Arc<Catalog>,
}

impl Processor {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Lexes a text source into an unprocessed document
    pub fn document(&self, source: &SourceText, default_branch: &str) -> Document {
        let lexed = lexer::lex(source);
        Document::new(lexed.cells, lexed.frontmatter).with_default_branch(default_branch)
    }

    /// Loads and lexes a source file
    pub fn open(&self, path: &Path, default_branch: &str) -> Result<Document> {
        let source = crate::source::load_from_file(path, &self.catalog.formats)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let text = source.into_text()?;
        Ok(self.document(&text, default_branch))
    }

    /// Prepares the root context and the effective tag table
    pub fn initialize_doc(
        &self,
        doc: &Document,
        spec_version: Option<&str>,
    ) -> Result<Document, ProcessError> {
        let mut doc = doc.clone();
        let frontmatter = match doc.frontmatter() {
            Some(cell) => Frontmatter::from_cell(cell)?,
            None => Frontmatter::default(),
        };

        let defs = match &frontmatter.tags {
            Some(table) => {
                let inline = tag_defs_from_value(table.clone(), &self.catalog.runners)?;
                Arc::new(self.catalog.tags.merged(&inline))
            }
            None => Arc::clone(&self.catalog.tags),
        };

        let defaults = collect_defaults(defs.iter().map(|d| &d.runner))?;
        let root = doc.root_context_mut();
        for (name, value) in defaults {
            root.attrs.set(name, value);
        }
        for (name, value) in frontmatter.vars.iter() {
            root.vars.set(name.clone(), value.clone());
        }
        for (name, value) in frontmatter.attrs.iter() {
            if !root.attrs.contains(name) {
                return Err(ProcessError::UnknownAttribute(name.clone()));
            }
            root.attrs.set(name.clone(), value.clone());
        }
        if let Some(version) = spec_version
            .map(str::to_string)
            .or_else(|| frontmatter.spec_version())
        {
            root.spec_version = version;
        }

        debug!(tags = defs.len(), attrs = root.attrs.len(), vars = root.vars.len(), "initialized document");
        doc.set_tag_defs(defs);
        Ok(doc)
    }

    /// Processes one cell on top of `doc`
    pub fn process_cell(
        &self,
        doc: &Document,
        input: CellInput,
    ) -> Result<(Document, Arc<Cell>), ProcessError> {
        let mut doc = doc.clone();
        let mut cell = match input {
            CellInput::Cell(cell) => cell,
            CellInput::Text { first_line, body } => notebook_cell(doc.episode_count(), &first_line, &body),
        };
        if cell.is_processed() {
            return Err(CellError::AlreadyProcessed(cell.name()).into());
        }

        let defs = doc
            .tag_defs()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.catalog.tags));
        let tags = parse_cell_tags(&cell, &defs)?;

        if let Some(name) = tags.name() {
            cell.set_name(name);
        }
        let name = cell.name();
        if doc.lookup_episode_by_cell_name(&name).is_some() {
            return Err(ProcessError::DuplicateName(name));
        }

        let (branch, parent) = route(&doc, &tags, &name)?;
        let input = match &parent {
            Some(reference) => doc.episode_output(reference)?,
            None => doc.root_context().clone(),
        };
        debug!(
            cell = %name,
            branch = %branch,
            parent = %parent.as_ref().map(ToString::to_string).unwrap_or_default(),
            tags = tags.len(),
            "process cell"
        );

        cell.attach(input.clone(), tags.clone())?;
        for phase in Phase::ORDER {
            let language = default_language(cell.run_context());
            for tag in tags.iter() {
                let result = tag.def.runner.apply(phase, tag, &mut cell, &language)?;
                cell.record_output(result.stdout, result.stderr, result.value);
            }
        }

        let cell = Arc::new(cell);
        doc.ensure_branch(&branch, parent)?;
        doc.append(&branch, Episode::new(input, Arc::clone(&cell)))?;
        Ok((doc, cell))
    }

    /// Initializes `doc` and processes every source cell in order
    pub fn process_doc(
        &self,
        doc: &Document,
        spec_version: Option<&str>,
    ) -> Result<Vec<Stage>, ProcessError> {
        let mut doc = self.initialize_doc(doc, spec_version)?;
        let cells: Vec<Cell> = doc.source().cells().to_vec();
        info!(cells = cells.len(), branch = doc.default_branch(), "processing document");

        let mut stages = Vec::with_capacity(cells.len());
        for cell in cells {
            let location = cell.location().clone();
            let (next, processed) = self.process_cell(&doc, CellInput::Cell(cell))?;
            doc = next;
            stages.push(Stage {
                document: doc.clone(),
                location,
                cell: processed,
            });
        }

        info!(
            episodes = doc.episode_count(),
            branches = doc.branch_names().len(),
            "processed document"
        );
        Ok(stages)
    }
}

fn default_language(run: Option<&RunContext>) -> String {
    run.and_then(|c| c.attrs.get_str(ATTR_LANGUAGE))
        .unwrap_or(DEFAULT_LANGUAGE)
        .to_string()
}

/// Directive tags of a code cell; other cells carry none
fn parse_cell_tags(cell: &Cell, defs: &TagDefs) -> Result<TagsInstances, ProcessError> {
    if cell.kind() != CellKind::Code {
        return Ok(TagsInstances::default());
    }
    let fenced = cell
        .directive_block()
        .filter(|f| is_directive(f))
        .ok_or_else(|| ProcessError::NotDirective(cell.name()))?;
    let lines: Vec<&str> = fenced
        .inner_lines()
        .iter()
        .map(|l| l.content.as_str())
        .collect();
    Ok(defs.parse_tags(&lines)?)
}

/// Branch and parent episode for a cell
fn route(
    doc: &Document,
    tags: &TagsInstances,
    name: &str,
) -> Result<(String, Option<EpisodeRef>), ProcessError> {
    let parent = tags
        .parent()
        .map(|p| {
            doc.lookup_episode_by_cell_name(p)
                .map(|e| e.reference())
                .ok_or_else(|| ProcessError::UnknownParent {
                    cell: name.to_string(),
                    parent: p.to_string(),
                })
        })
        .transpose()?;

    let (branch, parent) = match (tags.branch(), parent) {
        (Some(branch), parent) if doc.story(branch).is_some() => {
            let tip = doc.last_episode_in_branch(branch, false)?;
            (branch.to_string(), parent.or(tip))
        }
        (Some(branch), Some(parent)) => (branch.to_string(), Some(parent)),
        (Some(branch), None) => {
            let tip = doc.last_episode_in_branch(doc.default_branch(), true)?;
            (branch.to_string(), tip)
        }
        (None, Some(parent)) => {
            let tip = doc.last_episode_in_branch(&parent.branch, false)?;
            if tip.as_ref() == Some(&parent) {
                (parent.branch.clone(), Some(parent))
            } else {
                (name.to_string(), Some(parent))
            }
        }
        (None, None) => {
            let branch = doc.default_branch().to_string();
            let tip = doc.last_episode_in_branch(&branch, false)?;
            (branch, tip)
        }
    };

    if let Some(story) = doc.story(&branch) {
        if !story.arc.is_empty() {
            let tip = doc.last_episode_in_branch(&branch, false)?;
            if tip != parent {
                return Err(ProcessError::BranchParentMismatch {
                    branch,
                    tip: describe(tip.as_ref()),
                    parent: describe(parent.as_ref()),
                });
            }
        }
    }
    Ok((branch, parent))
}

fn describe(reference: Option<&EpisodeRef>) -> String {
    reference.map_or_else(|| "nothing".to_string(), ToString::to_string)
}

/// Wraps notebook input into a directive code cell at `notebook:<index>`
fn notebook_cell(index: usize, first_line: &str, body: &str) -> Cell {
    let src = Location::named(NOTEBOOK_SOURCE).child(index);
    let mut lines = vec![Line::new(0, format!("```{DIRECTIVE_KIND}\n"), &src)];
    let first = first_line.trim_end_matches(['\n', '\r']);
    lines.push(Line::new(1, format!("{first}\n"), &src));
    for text in body.split_inclusive('\n') {
        let text = if text.ends_with('\n') {
            text.to_string()
        } else {
            format!("{text}\n")
        };
        lines.push(Line::new(lines.len(), text, &src));
    }
    lines.push(Line::new(lines.len(), "```\n", &src));
    let fenced = Fenced::new(0, Some(DIRECTIVE_KIND.to_string()), lines, true, &src);
    Cell::code(vec![Block::Fenced(fenced)], src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::file::RAW_SECTION;
    use crate::domain::CellsStream;
    use pretty_assertions::assert_eq;

    fn processor() -> Processor {
        Processor::new(Arc::new(Catalog::builtin().unwrap()))
    }

    fn doc(processor: &Processor, name: &str, text: &str) -> Document {
        let format = processor
            .catalog()
            .formats
            .for_path(Path::new(name))
            .unwrap();
        processor.document(&SourceText::from_str(name, text, format), "main")
    }

    fn empty_doc() -> Document {
        Document::new(CellsStream::default(), None)
    }

    fn last(stages: &[Stage]) -> &Document {
        &stages.last().unwrap().document
    }

    #[test]
    fn heading_and_code_cell() {
        let p = processor();
        let d = doc(
            &p,
            "doc.md",
            "# Heading\n```vdf\n#code-section:content:new\nfoo();\n```\n",
        );
        assert_eq!(d.source().len(), 2);
        assert_eq!(d.source().cells()[0].kind(), CellKind::Doc);
        assert_eq!(d.source().cells()[1].kind(), CellKind::Code);

        let stages = p.process_doc(&d, None).unwrap();
        let code = &stages[1].cell;
        let output = code.output_context().unwrap();
        let file = output.files.get("main.vhd").unwrap();
        let lines = file.section_lines("content");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].content(), "foo();\n");
        assert_eq!(
            lines[0].provenance(),
            &[
                Location::named("doc.md").child(3usize),
                code.location().clone(),
                Location::named("#code-section:content:new"),
            ]
        );
        assert!(file.section_lines(RAW_SECTION).is_empty());

        let (rendered, map) = file.saves(output).unwrap();
        let at = rendered.iter().position(|l| l == "    foo();").unwrap();
        assert_eq!(map[at], serde_json::to_string(lines[0].provenance()).unwrap());
        let entity = rendered.iter().position(|l| l == "entity main is").unwrap();
        assert_eq!(map[entity], crate::domain::render::TEMPLATE_MARKER);
    }

    #[test]
    fn cells_chain_through_the_default_branch() {
        let p = processor();
        let d = doc(
            &p,
            "doc.md",
            "```vdf\n#var-width--8\n```\n\ntext\n\n```vhdl-vdf\n#code\nq <= d;\n```\n",
        );
        let stages = p.process_doc(&d, None).unwrap();
        let d = last(&stages);

        assert_eq!(d.branch_names(), vec!["main".to_string()]);
        assert_eq!(d.story("main").unwrap().arc.len(), 3);
        let out = stages[2].cell.output_context().unwrap();
        assert_eq!(out.vars.get("width"), Some(&serde_json::Value::from(8)));
        assert!(out.files.contains("main.vhd"));
        assert!(stages[0].cell.output_context().unwrap().files.is_empty());
    }

    #[test]
    fn duplicate_names_fail() {
        let p = processor();
        let d = doc(
            &p,
            "doc.md",
            "```vdf\n#name--a\n```\n```vdf\n#name--a\n```\n",
        );
        let err = p.process_doc(&d, None).unwrap_err();
        assert!(matches!(err, ProcessError::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn parent_that_is_not_a_tip_forks() {
        let p = processor();
        let d = doc(
            &p,
            "doc.md",
            "```vdf\n#name--a #var-x--1\n```\n\
             ```vdf\n#name--b #var-x--2\n```\n\
             ```vdf\n#name--c #parent--a\n```\n",
        );
        let stages = p.process_doc(&d, None).unwrap();
        let d = last(&stages);

        let c = d.lookup_episode_by_cell_name("c").unwrap();
        assert_eq!(c.branch, "c");
        assert_eq!(d.story("c").unwrap().parent, Some(EpisodeRef::new("main", 0)));
        let input = c.episode.cell.input_context().unwrap();
        assert_eq!(input.vars.get("x"), Some(&serde_json::Value::from(1)));
        assert_eq!(d.story("main").unwrap().arc.len(), 2);
    }

    #[test]
    fn parent_at_tip_continues_the_branch() {
        let p = processor();
        let d = doc(
            &p,
            "doc.md",
            "```vdf\n#name--a\n```\n```vdf\n#parent--a\n```\n",
        );
        let stages = p.process_doc(&d, None).unwrap();
        assert_eq!(last(&stages).story("main").unwrap().arc.len(), 2);
    }

    #[test]
    fn explicit_branch_forks_from_default_tip() {
        let p = processor();
        let d = doc(
            &p,
            "doc.md",
            "```vdf\n#var-x--1\n```\n\
             ```vdf\n#branch--feature #var-x--2\n```\n\
             ```vdf\n#branch--feature #name--f2\n```\n\
             ```vdf\n#name--m2\n```\n",
        );
        let stages = p.process_doc(&d, None).unwrap();
        let d = last(&stages);

        let feature = d.story("feature").unwrap();
        assert_eq!(feature.parent, Some(EpisodeRef::new("main", 0)));
        assert_eq!(feature.arc.len(), 2);
        let f2 = d.lookup_episode_by_cell_name("f2").unwrap();
        assert_eq!(
            f2.episode.cell.input_context().unwrap().vars.get("x"),
            Some(&serde_json::Value::from(2))
        );
        let m2 = d.lookup_episode_by_cell_name("m2").unwrap();
        assert_eq!(m2.branch, "main");
        assert_eq!(
            m2.episode.cell.input_context().unwrap().vars.get("x"),
            Some(&serde_json::Value::from(1))
        );
    }

    #[test]
    fn unknown_parent_fails() {
        let p = processor();
        let d = doc(&p, "doc.md", "```vdf\n#parent--ghost\n```\n");
        assert!(matches!(
            p.process_doc(&d, None),
            Err(ProcessError::UnknownParent { parent, .. }) if parent == "ghost"
        ));
    }

    #[test]
    fn reprocessing_fails() {
        let p = processor();
        let d = doc(&p, "doc.md", "```vdf\n#code\nx;\n```\n");
        let d = p.initialize_doc(&d, None).unwrap();
        let cell = d.source().cells()[0].clone();
        let (d, processed) = p.process_cell(&d, CellInput::Cell(cell)).unwrap();

        let again = (*processed).clone();
        assert!(matches!(
            p.process_cell(&d, CellInput::Cell(again)),
            Err(ProcessError::Cell(CellError::AlreadyProcessed(_)))
        ));
    }

    #[test]
    fn code_cell_without_directive_fails() {
        let p = processor();
        let src = Location::named("doc.md");
        let lines = vec![
            Line::new(0, "```python\n", &src),
            Line::new(1, "print()\n", &src),
            Line::new(2, "```\n", &src),
        ];
        let fenced = Fenced::new(0, Some("python".into()), lines, true, &src);
        let cell = Cell::code(vec![Block::Fenced(fenced)], src.child(0usize));

        let d = p.initialize_doc(&empty_doc(), None).unwrap();
        assert!(matches!(
            p.process_cell(&d, CellInput::Cell(cell)),
            Err(ProcessError::NotDirective(_))
        ));
    }

    #[test]
    fn frontmatter_seeds_the_root_context() {
        let p = processor();
        let d = doc(
            &p,
            "doc.vdf",
            "---\nvdf: \"0.2\"\nvars:\n  width: 8\nattrs:\n  language: verilog\n---\n%%\n```vdf\n#code\nassign q = d;\n```\n",
        );
        assert!(d.frontmatter().is_some());

        let stages = p.process_doc(&d, None).unwrap();
        let out = stages[0].cell.output_context().unwrap();
        assert_eq!(out.spec_version, "0.2");
        assert_eq!(out.vars.get("width"), Some(&serde_json::Value::from(8)));
        assert!(out.files.contains("main.v"));
    }

    #[test]
    fn explicit_spec_version_wins() {
        let p = processor();
        let d = doc(&p, "doc.vdf", "---\nvdf: \"0.2\"\n---\n%%\ntext\n");
        let d = p.initialize_doc(&d, Some("9.9")).unwrap();
        assert_eq!(d.root_context().spec_version, "9.9");
    }

    #[test]
    fn frontmatter_unknown_attribute_fails() {
        let p = processor();
        let d = doc(&p, "doc.vdf", "---\nattrs:\n  colour: red\n---\n%%\ntext\n");
        assert!(matches!(
            p.initialize_doc(&d, None),
            Err(ProcessError::UnknownAttribute(name)) if name == "colour"
        ));
    }

    #[test]
    fn frontmatter_inline_tags_extend_the_table() {
        let p = processor();
        let d = doc(
            &p,
            "doc.vdf",
            "---\ntags:\n  dump: {runner: show, value: \"?path\"}\n---\n%%\n```vdf\n#code\nx <= y;\n```\n%%\n```vdf\n#dump\n```\n",
        );
        let stages = p.process_doc(&d, None).unwrap();
        let stdout = stages[1].cell.stdout();
        assert_eq!(stdout.first().map(String::as_str), Some("==> main.vhd <=="));
    }

    #[test]
    fn notebook_text_becomes_code_cell() {
        let p = processor();
        let d = p.initialize_doc(&empty_doc(), None).unwrap();
        let (d, cell) = p
            .process_cell(
                &d,
                CellInput::Text {
                    first_line: "%%vdf #code".into(),
                    body: "a <= b;\nc <= d;".into(),
                },
            )
            .unwrap();

        assert_eq!(cell.location().to_string(), "notebook:0");
        let file = cell.output_context().unwrap().files.get("main.vhd").unwrap();
        let texts: Vec<String> = file
            .section_lines("content")
            .iter()
            .map(|l| l.content().to_string())
            .collect();
        assert_eq!(texts, vec!["a <= b;\n", "c <= d;\n"]);
        assert_eq!(d.episode_count(), 1);
    }
}
