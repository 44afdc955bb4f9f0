//! `#code`: writes a code cell's body into output file sections
//!
//! The body (the fenced block minus fences and directive lines) is split on
//! lines equal to the `section_divider` attribute. Each group goes to one
//! target section, in order. Targets come from the `section` variable
//! (`name[:action]`, comma separated) or the tag's output list.
//!
//! | Action    | Effect                                   |
//! |-----------|------------------------------------------|
//! | `append`  | appends to the subsection (default)      |
//! | `new`     | replaces the subsection                  |
//! | `replace` | replaces the whole section               |

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::target::{ATTR_TARGET_FILE, ATTR_TARGET_KIND};
use super::{publish_contexts, run_context_mut, RunnerError, RunnerResult, TagRunner};
use crate::domain::cell::{Cell, Fenced, Line};
use crate::domain::context::RunContext;
use crate::domain::file::{File, FileSpec, FileSpecs, GeneratedLine, Subsection};
use crate::domain::location::Location;
use crate::domain::phase::Phase;
use crate::domain::tags::{TagInstance, DIRECTIVE_KIND, DIRECTIVE_SUFFIX, TAG_MARKER};

pub const ATTR_LANGUAGE: &str = "language";
pub const ATTR_SECTION_DIVIDER: &str = "section_divider";

pub const DEFAULT_LANGUAGE: &str = "vhdl";
const DEFAULT_DIVIDER: &str = "%%";
const DEFAULT_FILE: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Append,
    New,
    Replace,
}

impl Action {
    fn parse(action: &str, line: &str) -> Result<Self, RunnerError> {
        match action {
            "" | "append" => Ok(Action::Append),
            "new" => Ok(Action::New),
            "replace" => Ok(Action::Replace),
            other => Err(RunnerError::UnknownAction {
                action: other.to_string(),
                line: line.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodeRunner {
    files: Arc<FileSpecs>,
}

impl CodeRunner {
    pub fn new(files: Arc<FileSpecs>) -> Self {
        Self { files }
    }

    /// Language declared by the fence itself, if any
    fn fence_language(fenced: &Fenced) -> Option<&str> {
        let kind = fenced.kind.as_deref()?;
        if let Some(language) = kind.strip_suffix(DIRECTIVE_SUFFIX) {
            return Some(language).filter(|l| !l.is_empty());
        }
        Some(kind).filter(|k| *k != DIRECTIVE_KIND)
    }

    /// Output file name and kind for a cell
    fn target(
        &self,
        tag: &TagInstance,
        fenced: &Fenced,
        run: &RunContext,
        default_language: &str,
    ) -> Result<(String, Arc<FileSpec>), RunnerError> {
        let name = tag
            .var("file")
            .filter(|f| !f.is_empty())
            .or_else(|| run.attrs.get_str(ATTR_TARGET_FILE))
            .unwrap_or(DEFAULT_FILE)
            .to_string();

        let spec = match (Self::fence_language(fenced), run.attrs.get_str(ATTR_TARGET_KIND)) {
            (Some(language), _) => self.for_language(language)?,
            (None, Some(kind)) => self.files.get(kind)?,
            (None, None) => self.for_language(default_language)?,
        };
        Ok((name, spec))
    }

    fn for_language(&self, language: &str) -> Result<Arc<FileSpec>, RunnerError> {
        self.files
            .for_language(language)
            .ok_or_else(|| RunnerError::UnknownLanguage(language.to_string()))
    }

    /// `(section, action)` pairs named by the tag
    fn targets(tag: &TagInstance) -> Result<Vec<(String, Action)>, RunnerError> {
        let default_action = tag.var("action").unwrap_or_default();
        let declared: Vec<&str> = tag
            .var("section")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if declared.is_empty() {
            let action = Action::parse(default_action, &tag.line)?;
            return Ok(tag.def.output.iter().map(|s| (s.clone(), action)).collect());
        }
        declared
            .into_iter()
            .map(|entry| {
                let (section, action) = entry.split_once(':').unwrap_or((entry, default_action));
                Ok((section.to_string(), Action::parse(action, &tag.line)?))
            })
            .collect()
    }

    fn write(
        &self,
        tag: &TagInstance,
        cell: &mut Cell,
        default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        let fenced = cell
            .directive_block()
            .cloned()
            .ok_or_else(|| RunnerError::NoDirectiveBlock(cell.name()))?;
        let consumed = cell.tags().map(|t| t.consumed()).unwrap_or(0);
        let cell_location = cell.location().clone();
        let tag_location = Location::named(format!("{}{}", TAG_MARKER, tag.line));
        let targets = Self::targets(tag)?;

        let run = run_context_mut(cell)?;
        let (name, spec) = self.target(tag, &fenced, run, default_language)?;
        let divider = run
            .attrs
            .get_str(ATTR_SECTION_DIVIDER)
            .unwrap_or(DEFAULT_DIVIDER)
            .to_string();

        let body: Vec<&Line> = fenced.inner_lines().iter().skip(consumed).collect();
        let groups: Vec<Vec<&Line>> = body
            .split(|line| line.text().trim() == divider)
            .map(<[&Line]>::to_vec)
            .collect();
        if groups.len() > targets.len() {
            return Err(RunnerError::TooManyGroups {
                groups: groups.len(),
                sections: targets.len(),
                line: tag.line.clone(),
            });
        }

        let snapshot = Arc::new(run.clone());
        let path = format!("{}{}", name, spec.ext);
        let mut file = run
            .files
            .get(&path)
            .cloned()
            .unwrap_or_else(|| File::new(name, Arc::clone(&spec)));
        let subsection = Subsection::from(tag.var("subsection").unwrap_or_default());

        for (group, (section, action)) in groups.into_iter().zip(targets) {
            let lines: Vec<GeneratedLine> = group
                .into_iter()
                .map(|line| {
                    GeneratedLine::new(
                        line.content.clone(),
                        vec![
                            line.location.clone(),
                            cell_location.clone(),
                            tag_location.clone(),
                        ],
                        Arc::clone(&snapshot),
                    )
                })
                .collect();
            debug!(file = %path, section = %section, ?action, lines = lines.len(), "write section");
            match action {
                Action::Append => file.modify(&section, lines, subsection.clone(), true)?,
                Action::New => file.modify(&section, lines, subsection.clone(), false)?,
                Action::Replace => file.modify(&section, lines, Subsection::All, false)?,
            }
        }

        run.files.upsert(file);
        Ok(RunnerResult::empty())
    }

    fn publish(
        &self,
        tag: &TagInstance,
        cell: &mut Cell,
        default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        let fenced = cell
            .directive_block()
            .cloned()
            .ok_or_else(|| RunnerError::NoDirectiveBlock(cell.name()))?;
        let (run, output) = publish_contexts(cell)?;
        let (name, spec) = self.target(tag, &fenced, run, default_language)?;
        let path = format!("{}{}", name, spec.ext);
        let file = run
            .files
            .get(&path)
            .cloned()
            .ok_or(RunnerError::MissingFile(path))?;
        output.files.upsert(file);
        Ok(RunnerResult::empty())
    }
}

impl TagRunner for CodeRunner {
    fn id(&self) -> &'static str {
        "code"
    }

    fn apply(
        &self,
        phase: Phase,
        tag: &TagInstance,
        cell: &mut Cell,
        default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        match phase {
            Phase::Code => self.write(tag, cell, default_language),
            Phase::Finalize => self.publish(tag, cell, default_language),
            _ => Ok(RunnerResult::empty()),
        }
    }

    fn defaults(&self) -> Option<Map<String, Value>> {
        let mut defaults = Map::new();
        defaults.insert(ATTR_LANGUAGE.into(), Value::String(DEFAULT_LANGUAGE.into()));
        defaults.insert(
            ATTR_SECTION_DIVIDER.into(),
            Value::String(DEFAULT_DIVIDER.into()),
        );
        Some(defaults)
    }
}
