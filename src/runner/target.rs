//! `#target-<file>[-<kind>]`: default output file for later code tags

use serde_json::{Map, Value};

use super::{publish_contexts, run_context_mut, RunnerError, RunnerResult, TagRunner};
use crate::domain::cell::Cell;
use crate::domain::phase::Phase;
use crate::domain::tags::TagInstance;

pub const ATTR_TARGET_FILE: &str = "target_file";
pub const ATTR_TARGET_KIND: &str = "target_kind";

#[derive(Debug, Clone, Copy, Default)]
pub struct TargetRunner;

impl TagRunner for TargetRunner {
    fn id(&self) -> &'static str {
        "target"
    }

    fn apply(
        &self,
        phase: Phase,
        tag: &TagInstance,
        cell: &mut Cell,
        _default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        match phase {
            Phase::Target => {
                let run = run_context_mut(cell)?;
                run.attrs
                    .set(ATTR_TARGET_FILE, tag.var("file").unwrap_or_default());
                if let Some(kind) = tag.var("kind").filter(|k| !k.is_empty()) {
                    run.attrs.set(ATTR_TARGET_KIND, kind);
                }
            }
            Phase::Finalize => {
                let (run, output) = publish_contexts(cell)?;
                for attr in [ATTR_TARGET_FILE, ATTR_TARGET_KIND] {
                    if let Some(value) = run.attrs.get(attr) {
                        output.attrs.set(attr, value.clone());
                    }
                }
            }
            _ => {}
        }
        Ok(RunnerResult::empty())
    }

    fn defaults(&self) -> Option<Map<String, Value>> {
        let mut defaults = Map::new();
        defaults.insert(ATTR_TARGET_FILE.into(), Value::String(String::new()));
        defaults.insert(ATTR_TARGET_KIND.into(), Value::String(String::new()));
        Some(defaults)
    }
}
