//! `#var-<name>--<value>`: document variables

use tracing::debug;

use super::{parse_scalar, publish_contexts, run_context_mut, RunnerError, RunnerResult, TagRunner};
use crate::domain::cell::Cell;
use crate::domain::phase::Phase;
use crate::domain::tags::TagInstance;

#[derive(Debug, Clone, Copy, Default)]
pub struct VarsRunner;

fn var_name(tag: &TagInstance) -> &str {
    tag.var("name").unwrap_or_default()
}

impl TagRunner for VarsRunner {
    fn id(&self) -> &'static str {
        "vars"
    }

    fn apply(
        &self,
        phase: Phase,
        tag: &TagInstance,
        cell: &mut Cell,
        _default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        match phase {
            Phase::Vars => {
                let value = parse_scalar(tag.value.as_deref().unwrap_or_default());
                debug!(name = var_name(tag), %value, "set variable");
                run_context_mut(cell)?.vars.set(var_name(tag), value);
            }
            Phase::Finalize => {
                let (run, output) = publish_contexts(cell)?;
                if let Some(value) = run.vars.get(var_name(tag)) {
                    output.vars.set(var_name(tag), value.clone());
                }
            }
            _ => {}
        }
        Ok(RunnerResult::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::RunContext;
    use crate::domain::tags::{TagArg, TagDef, TagDefs, ValueSlot};
    use crate::runner::test_support::code_cell;
    use serde_json::json;
    use std::sync::Arc;

    fn defs() -> TagDefs {
        let mut defs = TagDefs::new();
        defs.insert(
            TagDef::new("var", Arc::new(VarsRunner))
                .with_arg(TagArg::new("name", true))
                .with_value(ValueSlot::Required("value".into()))
                .accumulating(),
        );
        defs
    }

    #[test]
    fn variable_is_published_at_finalize() {
        let defs = defs();
        let mut cell = code_cell(&defs, "vdf", &["#var-width--8 #var-name--top"], RunContext::default());
        let tags: Vec<_> = cell.tags().unwrap().iter().cloned().collect();

        for tag in &tags {
            VarsRunner.apply(Phase::Vars, tag, &mut cell, "vhdl").unwrap();
        }
        assert_eq!(cell.run_context().unwrap().vars.get("width"), Some(&json!(8)));
        assert!(cell.output_context().unwrap().vars.is_empty());

        for tag in &tags {
            VarsRunner.apply(Phase::Finalize, tag, &mut cell, "vhdl").unwrap();
        }
        let output = cell.output_context().unwrap();
        assert_eq!(output.vars.get("width"), Some(&json!(8)));
        assert_eq!(output.vars.get("name"), Some(&json!("top")));
        assert!(cell.input_context().unwrap().vars.is_empty());
    }
}
