//! `#include--<path>`: brings an existing source file into the run context
//!
//! The file is read verbatim into the `raw` section of an outer file whose
//! kind follows its suffix. Outer files accept no other section, so later
//! `#code` cells cannot write into them. Relative paths resolve against the
//! working directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{publish_contexts, run_context_mut, RunnerError, RunnerResult, TagRunner};
use crate::domain::cell::Cell;
use crate::domain::file::{File, FileSpecs, GeneratedLine, Subsection, RAW_SECTION};
use crate::domain::location::Location;
use crate::domain::phase::Phase;
use crate::domain::tags::{TagInstance, TAG_MARKER};

#[derive(Debug, Clone)]
pub struct IncludeRunner {
    files: Arc<FileSpecs>,
}

impl IncludeRunner {
    pub fn new(files: Arc<FileSpecs>) -> Self {
        Self { files }
    }

    /// Output name and suffix of an included path
    fn split(source: &str) -> Result<(String, String), RunnerError> {
        let path = Path::new(source);
        let stem = path.file_stem().and_then(|s| s.to_str());
        let ext = path.extension().and_then(|s| s.to_str());
        match (stem, ext) {
            (Some(stem), Some(ext)) => Ok((stem.to_string(), format!(".{ext}"))),
            _ => Err(RunnerError::UnknownExtension(source.to_string())),
        }
    }

    fn read(&self, tag: &TagInstance, cell: &mut Cell) -> Result<RunnerResult, RunnerError> {
        let source = tag.value.clone().unwrap_or_default();
        let (name, ext) = Self::split(&source)?;
        let spec = self
            .files
            .for_ext(&ext)
            .ok_or_else(|| RunnerError::UnknownExtension(source.clone()))?;
        let text = fs::read_to_string(&source).map_err(|e| RunnerError::Include {
            path: source.clone(),
            source: e,
        })?;

        let cell_location = cell.location().clone();
        let tag_location = Location::named(format!("{}{}", TAG_MARKER, tag.line));
        let origin = Location::named(source.as_str());

        let run = run_context_mut(cell)?;
        let snapshot = Arc::new(run.clone());
        let lines: Vec<GeneratedLine> = text
            .split_inclusive('\n')
            .enumerate()
            .map(|(i, line)| {
                GeneratedLine::new(
                    line,
                    vec![origin.child(i), cell_location.clone(), tag_location.clone()],
                    Arc::clone(&snapshot),
                )
            })
            .collect();
        debug!(path = %source, kind = %spec.kind, lines = lines.len(), "include");

        let mut file = File::outer(name, spec);
        file.modify(RAW_SECTION, lines, Subsection::Default, false)?;
        run.files.upsert(file);
        Ok(RunnerResult::empty())
    }

    fn publish(&self, tag: &TagInstance, cell: &mut Cell) -> Result<RunnerResult, RunnerError> {
        let source = tag.value.clone().unwrap_or_default();
        let (name, ext) = Self::split(&source)?;
        let path = format!("{name}{ext}");
        let (run, output) = publish_contexts(cell)?;
        let file = run
            .files
            .get(&path)
            .cloned()
            .ok_or(RunnerError::MissingFile(path))?;
        output.files.upsert(file);
        Ok(RunnerResult::empty())
    }
}

impl TagRunner for IncludeRunner {
    fn id(&self) -> &'static str {
        "include"
    }

    fn apply(
        &self,
        phase: Phase,
        tag: &TagInstance,
        cell: &mut Cell,
        _default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        match phase {
            Phase::Externals => self.read(tag, cell),
            Phase::Finalize => self.publish(tag, cell),
            _ => Ok(RunnerResult::empty()),
        }
    }
}
