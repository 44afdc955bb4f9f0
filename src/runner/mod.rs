//! Tag runners
//!
//! Every tag definition names a runner. The processor calls each attached
//! tag's runner once per [`Phase`]; a runner ignores the phases it does not
//! act on by returning [`RunnerResult::empty`].
//!
//! | Runner   | Acts in            | Effect                                  |
//! |----------|--------------------|-----------------------------------------|
//! | `none`   | -                  | meta tags (`name`, `parent`, `branch`)  |
//! | `vars`   | vars, finalize     | sets a document variable                |
//! | `include`| exts, finalize     | reads an existing file as an outer file |
//! | `target` | target, finalize   | sets the default output file            |
//! | `attrs`  | attrs, finalize    | sets a declared document attribute      |
//! | `code`   | code, finalize     | writes the cell body into file sections |
//! | `show`   | show               | renders files into the cell's stdout    |
//!
//! Work happens on the cell's run context; finalize publishes the result to
//! the output context, which is what later cells inherit.

pub mod attrs;
pub mod code;
pub mod include;
pub mod meta;
pub mod show;
pub mod target;
pub mod vars;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::cell::Cell;
use crate::domain::context::RunContext;
use crate::domain::file::{FileError, FileSpecs};
use crate::domain::phase::Phase;
use crate::domain::render::RenderError;
use crate::domain::tags::TagInstance;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Unknown runner '{0}'")]
    UnknownRunner(String),

    #[error("Attribute '{attr}' is declared by both runner '{first}' and runner '{second}'")]
    DuplicateAttribute {
        attr: String,
        first: String,
        second: String,
    },

    #[error("No file kind is registered for language '{0}'")]
    UnknownLanguage(String),

    #[error("Unknown attribute '{name}' (line '{line}')")]
    UnknownAttribute { name: String, line: String },

    #[error("Unknown section action '{action}' (line '{line}')")]
    UnknownAction { action: String, line: String },

    #[error("Cell body has {groups} section groups but the tag names {sections} sections (line '{line}')")]
    TooManyGroups {
        groups: usize,
        sections: usize,
        line: String,
    },

    #[error("No file kind is registered for the suffix of '{0}'")]
    UnknownExtension(String),

    #[error("Cannot include '{path}': {source}")]
    Include {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File '{0}' does not exist in the run context")]
    MissingFile(String),

    #[error("Cell '{0}' has no directive block")]
    NoDirectiveBlock(String),

    #[error("Cell '{0}' has no contexts attached")]
    Unattached(String),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result of one runner call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerResult {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub value: Option<Value>,
}

impl RunnerResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn stdout(lines: Vec<String>) -> Self {
        Self {
            stdout: lines,
            ..Self::default()
        }
    }
}

/// Phase handler bound to tag definitions
pub trait TagRunner: Send + Sync + fmt::Debug {
    /// Identifier used by the tag table
    fn id(&self) -> &'static str;

    fn apply(
        &self,
        phase: Phase,
        tag: &TagInstance,
        cell: &mut Cell,
        default_language: &str,
    ) -> Result<RunnerResult, RunnerError>;

    /// Document attributes owned by this runner, with their defaults
    fn defaults(&self) -> Option<Map<String, Value>> {
        None
    }
}

/// Runners by identifier
#[derive(Debug, Clone, Default)]
pub struct RunnerRegistry {
    runners: BTreeMap<&'static str, Arc<dyn TagRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in runner
    pub fn builtin(files: Arc<FileSpecs>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(meta::MetaRunner));
        registry.register(Arc::new(vars::VarsRunner));
        registry.register(Arc::new(attrs::AttrsRunner));
        registry.register(Arc::new(target::TargetRunner));
        registry.register(Arc::new(include::IncludeRunner::new(Arc::clone(&files))));
        registry.register(Arc::new(code::CodeRunner::new(Arc::clone(&files))));
        registry.register(Arc::new(show::ShowRunner));
        registry
    }

    pub fn register(&mut self, runner: Arc<dyn TagRunner>) {
        self.runners.insert(runner.id(), runner);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn TagRunner>, RunnerError> {
        self.runners
            .get(id)
            .cloned()
            .ok_or_else(|| RunnerError::UnknownRunner(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.runners.keys().copied()
    }
}

/// Merges the attribute defaults of `runners`, each attribute owned once
pub fn collect_defaults<'a>(
    runners: impl IntoIterator<Item = &'a Arc<dyn TagRunner>>,
) -> Result<Map<String, Value>, RunnerError> {
    let mut owners: BTreeMap<String, &'static str> = BTreeMap::new();
    let mut seen: Vec<&'static str> = Vec::new();
    let mut result = Map::new();
    for runner in runners {
        if seen.contains(&runner.id()) {
            continue;
        }
        seen.push(runner.id());
        for (attr, value) in runner.defaults().unwrap_or_default() {
            if let Some(first) = owners.get(&attr) {
                return Err(RunnerError::DuplicateAttribute {
                    attr,
                    first: first.to_string(),
                    second: runner.id().to_string(),
                });
            }
            owners.insert(attr.clone(), runner.id());
            result.insert(attr, value);
        }
    }
    Ok(result)
}

/// Run context of a processed cell
pub(crate) fn run_context_mut(cell: &mut Cell) -> Result<&mut RunContext, RunnerError> {
    let name = cell.name();
    cell.run_context_mut()
        .ok_or(RunnerError::Unattached(name))
}

/// Run and output contexts of a processed cell
pub(crate) fn publish_contexts(
    cell: &mut Cell,
) -> Result<(&RunContext, &mut RunContext), RunnerError> {
    let name = cell.name();
    cell.run_and_output_mut()
        .ok_or(RunnerError::Unattached(name))
}

/// Reads a tag value as a YAML scalar; plain text stays a string
pub(crate) fn parse_scalar(text: &str) -> Value {
    if text.is_empty() {
        return Value::String(String::new());
    }
    match serde_yaml::from_str::<Value>(text) {
        Ok(value @ (Value::Bool(_) | Value::Number(_))) => value,
        _ => Value::String(text.to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_registry_resolves_ids() {
        let registry = RunnerRegistry::builtin(Arc::new(FileSpecs::new()));
        for id in ["none", "vars", "attrs", "include", "target", "code", "show"] {
            assert_eq!(registry.get(id).unwrap().id(), id);
        }
        assert!(matches!(
            registry.get("bogus"),
            Err(RunnerError::UnknownRunner(id)) if id == "bogus"
        ));
    }

    #[test]
    fn defaults_are_merged_once_per_runner() {
        let registry = RunnerRegistry::builtin(Arc::new(FileSpecs::new()));
        let code = registry.get("code").unwrap();
        let target = registry.get("target").unwrap();
        let defaults = collect_defaults([&code, &target, &code]).unwrap();
        assert_eq!(defaults.get("language"), Some(&json!("vhdl")));
        assert_eq!(defaults.get("target_file"), Some(&json!("")));
    }

    #[test]
    fn duplicate_attribute_ownership_fails() {
        #[derive(Debug)]
        struct Clash;
        impl TagRunner for Clash {
            fn id(&self) -> &'static str {
                "clash"
            }
            fn apply(
                &self,
                _: Phase,
                _: &TagInstance,
                _: &mut Cell,
                _: &str,
            ) -> Result<RunnerResult, RunnerError> {
                Ok(RunnerResult::empty())
            }
            fn defaults(&self) -> Option<Map<String, Value>> {
                let mut map = Map::new();
                map.insert("language".into(), json!("verilog"));
                Some(map)
            }
        }

        let registry = RunnerRegistry::builtin(Arc::new(FileSpecs::new()));
        let code = registry.get("code").unwrap();
        let clash: Arc<dyn TagRunner> = Arc::new(Clash);
        let err = collect_defaults([&code, &clash]).unwrap_err();
        assert!(matches!(err, RunnerError::DuplicateAttribute { attr, .. } if attr == "language"));
    }

    #[test]
    fn scalars_keep_plain_text() {
        assert_eq!(parse_scalar("8"), json!(8));
        assert_eq!(parse_scalar("true"), json!(true));
        assert_eq!(parse_scalar("8-bit"), json!("8-bit"));
        assert_eq!(parse_scalar("a: b"), json!("a: b"));
        assert_eq!(parse_scalar(""), json!(""));
    }
}
