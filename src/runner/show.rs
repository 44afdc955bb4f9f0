//! `#show[--<path>]`: renders output files into the cell's stdout

use super::{RunnerError, RunnerResult, TagRunner};
use crate::domain::cell::Cell;
use crate::domain::file::File;
use crate::domain::phase::Phase;
use crate::domain::tags::TagInstance;

#[derive(Debug, Clone, Copy, Default)]
pub struct ShowRunner;

impl TagRunner for ShowRunner {
    fn id(&self) -> &'static str {
        "show"
    }

    fn apply(
        &self,
        phase: Phase,
        tag: &TagInstance,
        cell: &mut Cell,
        _default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        if phase != Phase::Show {
            return Ok(RunnerResult::empty());
        }
        let run = cell
            .run_context()
            .ok_or_else(|| RunnerError::Unattached(cell.name()))?;

        let files: Vec<&File> = match tag.value.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => vec![run
                .files
                .get(path)
                .ok_or_else(|| RunnerError::MissingFile(path.to_string()))?],
            None => run.files.iter().collect(),
        };

        let mut stdout = Vec::new();
        for file in files {
            let (lines, _) = file.saves(run)?;
            stdout.push(format!("==> {} <==", file.path()));
            stdout.extend(lines);
        }
        Ok(RunnerResult::stdout(stdout))
    }
}
