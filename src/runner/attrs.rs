//! `#attr-<name>--<value>`: document attributes
//!
//! Only attributes declared by some runner's defaults can be set.

use super::{parse_scalar, publish_contexts, run_context_mut, RunnerError, RunnerResult, TagRunner};
use crate::domain::cell::Cell;
use crate::domain::phase::Phase;
use crate::domain::tags::TagInstance;

#[derive(Debug, Clone, Copy, Default)]
pub struct AttrsRunner;

impl TagRunner for AttrsRunner {
    fn id(&self) -> &'static str {
        "attrs"
    }

    fn apply(
        &self,
        phase: Phase,
        tag: &TagInstance,
        cell: &mut Cell,
        _default_language: &str,
    ) -> Result<RunnerResult, RunnerError> {
        let name = tag.var("name").unwrap_or_default();
        match phase {
            Phase::Attrs => {
                let run = run_context_mut(cell)?;
                if !run.attrs.contains(name) {
                    return Err(RunnerError::UnknownAttribute {
                        name: name.to_string(),
                        line: tag.line.clone(),
                    });
                }
                run.attrs
                    .set(name, parse_scalar(tag.value.as_deref().unwrap_or_default()));
            }
            Phase::Finalize => {
                let (run, output) = publish_contexts(cell)?;
                if let Some(value) = run.attrs.get(name) {
                    output.attrs.set(name, value.clone());
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
            TagDef::new("attr", Arc::new(AttrsRunner))
                .with_arg(TagArg::new("name", true))
                .with_value(ValueSlot::Required("value".into())),
        );
        defs
    }

    fn context() -> RunContext {
        let mut ctx = RunContext::default();
        ctx.attrs.set("language", "vhdl");
        ctx
    }

    #[test]
    fn declared_attribute_is_set() {
        let defs = defs();
        let mut cell = code_cell(&defs, "vdf", &["#attr-language--verilog"], context());
        let tag = cell.tags().unwrap().iter().next().cloned().unwrap();

        AttrsRunner.apply(Phase::Attrs, &tag, &mut cell, "vhdl").unwrap();
        AttrsRunner.apply(Phase::Finalize, &tag, &mut cell, "vhdl").unwrap();
        assert_eq!(
            cell.output_context().unwrap().attrs.get("language"),
            Some(&json!("verilog"))
        );
    }

    #[test]
    fn undeclared_attribute_fails() {
        let defs = defs();
        let mut cell = code_cell(&defs, "vdf", &["#attr-colour--red"], context());
        let tag = cell.tags().unwrap().iter().next().cloned().unwrap();

        let err = AttrsRunner.apply(Phase::Attrs, &tag, &mut cell, "vhdl").unwrap_err();
        assert!(matches!(err, RunnerError::UnknownAttribute { name, .. } if name == "colour"));
    }
}
