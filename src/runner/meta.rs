//! Runner for tags that only carry metadata

use super::{RunnerError, RunnerResult, TagRunner};
use crate::domain::cell::Cell;
use crate::domain::phase::Phase;
use crate::domain::tags::TagInstance;

/// Name, parent and branch tags are read by the processor directly
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaRunner;

impl TagRunner for MetaRunner {
    fn id(&self) -> &'static str {
        "none"
    }

    fn apply(
        &self,
        _phase: Phase,
        _tag: &TagInstance,
        _cell: &mut Cell,
        _default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        Ok(RunnerResult::empty())
    }
}
