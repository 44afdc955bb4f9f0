//! Static configuration tables
//!
//! Three YAML tables drive the engine: source formats, output file kinds and
//! tags. Built-in copies are embedded in the binary; `vdf.toml` may point any
//! of them at a replacement file.
//!
//! Every table may hold a `_fallback_` entry. Its keys are copied into every
//! other entry that does not set them. Entry names must not start with `_`.

use anyhow::{Context, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::config::{Config, ConfigError};
use crate::domain::file::{FileSpec, FileSpecs, Renderer};
use crate::domain::tags::{SubTag, TagArg, TagDef, TagDefs, ValueSlot};
use crate::runner::RunnerRegistry;
use crate::source::escape::DEFAULT_ESCAPE;
use crate::source::format::{
    FormatKind, SourceFormat, SourceFormats, DEFAULT_FENCE, DEFAULT_FENCE_PATTERN,
};

/// Entry whose keys fill the gaps of every other entry
pub const FALLBACK_KEY: &str = "_fallback_";

const BUILTIN_FORMATS: &str = include_str!("defaults/formats.yaml");
const BUILTIN_FILES: &str = include_str!("defaults/files.yaml");
const BUILTIN_TAGS: &str = include_str!("defaults/tags.yaml");

/// Loaded tables plus the runner registry the tag table resolved against
#[derive(Debug, Clone)]
pub struct Catalog {
    pub formats: SourceFormats,
    pub files: Arc<FileSpecs>,
    pub runners: RunnerRegistry,
    pub tags: Arc<TagDefs>,
}

impl Catalog {
    /// Catalog from the embedded tables
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_tables(BUILTIN_FORMATS, BUILTIN_FILES, BUILTIN_TAGS)
    }

    /// Catalog from table texts
    pub fn from_tables(formats: &str, files: &str, tags: &str) -> Result<Self, ConfigError> {
        let formats = parse_format_table(formats)?;
        let files = Arc::new(parse_file_table(files)?);
        let runners = RunnerRegistry::builtin(Arc::clone(&files));
        let tags = Arc::new(parse_tag_table(tags, &runners)?);
        Ok(Self {
            formats,
            files,
            runners,
            tags,
        })
    }

    /// Catalog with the overrides named in the project configuration
    pub fn load(config: &Config) -> Result<Self> {
        let tables = &config.project.tables;
        let formats = read_table(config, tables.formats.as_deref(), BUILTIN_FORMATS)?;
        let files = read_table(config, tables.files.as_deref(), BUILTIN_FILES)?;
        let tags = read_table(config, tables.tags.as_deref(), BUILTIN_TAGS)?;
        Self::from_tables(&formats, &files, &tags).context("Failed to load tables")
    }
}

fn read_table(
    config: &Config,
    path: Option<&Path>,
    builtin: &'static str,
) -> Result<Cow<'static, str>> {
    let Some(path) = path else {
        return Ok(Cow::Borrowed(builtin));
    };
    let path = config.resolve(path);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read table: {}", path.display()))?;
    Ok(Cow::Owned(text))
}

fn table_error(table: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Table {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

/// Entries of a table with `_fallback_` applied, in name order
fn entries(table: &str, data: Value) -> Result<Vec<(String, Value)>, ConfigError> {
    let mut data = match data {
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        _ => return Err(table_error(table, "expected a mapping")),
    };
    let fallback = match data.remove(FALLBACK_KEY) {
        None | Some(Value::Null) => Mapping::new(),
        Some(Value::Mapping(m)) => m,
        Some(_) => return Err(table_error(table, "_fallback_ must be a mapping")),
    };

    let mut result = BTreeMap::new();
    for (key, entry) in data {
        let name = key
            .as_str()
            .ok_or_else(|| table_error(table, "entry names must be strings"))?
            .to_string();
        if name.starts_with('_') {
            return Err(ConfigError::ReservedName(name));
        }
        let mut entry = match entry {
            Value::Mapping(m) => m,
            Value::Null => Mapping::new(),
            _ => return Err(table_error(table, format!("entry '{name}' must be a mapping"))),
        };
        for (k, v) in &fallback {
            if !entry.contains_key(k) {
                entry.insert(k.clone(), v.clone());
            }
        }
        result.insert(name, Value::Mapping(entry));
    }
    Ok(result.into_iter().collect())
}

fn decode<T: DeserializeOwned>(table: &str, name: &str, entry: Value) -> Result<T, ConfigError> {
    serde_yaml::from_value(entry).map_err(|e| table_error(table, format!("{name}: {e}")))
}

fn load_yaml(table: &str, text: &str) -> Result<Value, ConfigError> {
    serde_yaml::from_str(text).map_err(|e| table_error(table, e))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FormatEntry {
    #[serde(default)]
    kind: FormatKind,
    #[serde(default)]
    ext: Vec<String>,
    escape: Option<char>,
    fence: Option<String>,
    fence_regex: Option<String>,
    #[serde(default)]
    cells_split: Vec<String>,
    #[serde(default)]
    frontmatter: bool,
}

/// Parses the source format table
pub fn parse_format_table(text: &str) -> Result<SourceFormats, ConfigError> {
    let mut formats = SourceFormats::new();
    for (name, entry) in entries("formats", load_yaml("formats", text)?)? {
        let entry: FormatEntry = decode("formats", &name, entry)?;
        let pattern = entry
            .fence_regex
            .unwrap_or_else(|| DEFAULT_FENCE_PATTERN.to_string());
        let fence_regex = Regex::new(&pattern)
            .map_err(|e| table_error("formats", format!("{name}: {e}")))?;
        if entry.cells_split.iter().any(|s| s.trim().is_empty()) {
            return Err(table_error("formats", format!("{name}: empty cells_split entry")));
        }

        let mut format = SourceFormat::new(name, fence_regex);
        format.kind = entry.kind;
        format.ext = entry.ext;
        format.escape = entry.escape.unwrap_or(DEFAULT_ESCAPE);
        format.fence = entry.fence.unwrap_or_else(|| DEFAULT_FENCE.to_string());
        format.cells_split = entry.cells_split;
        format.frontmatter = entry.frontmatter;
        formats.insert(format);
    }
    Ok(formats)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileEntry {
    #[serde(default)]
    renderer: Renderer,
    ext: String,
    #[serde(default)]
    sections: Vec<String>,
    #[serde(default)]
    template: String,
    language: Option<String>,
}

/// Parses the file kind table
pub fn parse_file_table(text: &str) -> Result<FileSpecs, ConfigError> {
    let mut specs = FileSpecs::new();
    for (name, entry) in entries("files", load_yaml("files", text)?)? {
        let entry: FileEntry = decode("files", &name, entry)?;
        let mut spec = FileSpec::new(name, entry.renderer, entry.ext, entry.sections, entry.template);
        if let Some(language) = entry.language {
            spec = spec.with_language(language);
        }
        specs.insert(spec);
    }
    Ok(specs)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArgEntry {
    var: String,
    #[serde(default)]
    mandatory: bool,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TagEntry {
    #[serde(default = "default_runner")]
    runner: String,
    kind: Option<String>,
    #[serde(default)]
    vars: BTreeMap<String, Option<String>>,
    #[serde(default)]
    subtags: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    args: Vec<ArgEntry>,
    value: Option<String>,
    #[serde(default)]
    output: Vec<String>,
    #[serde(default)]
    accumulate: bool,
    #[serde(default)]
    requires: Vec<String>,
}

fn default_runner() -> String {
    "none".to_string()
}

/// Parses the tag table, resolving runners against `registry`
pub fn parse_tag_table(text: &str, registry: &RunnerRegistry) -> Result<TagDefs, ConfigError> {
    tag_defs_from_value(load_yaml("tags", text)?, registry)
}

/// Builds tag definitions from an already parsed table
///
/// Used for inline tag tables declared in a document's frontmatter.
pub fn tag_defs_from_value(data: Value, registry: &RunnerRegistry) -> Result<TagDefs, ConfigError> {
    let mut defs = TagDefs::new();
    for (name, entry) in entries("tags", data)? {
        let entry: TagEntry = decode("tags", &name, entry)?;
        defs.insert(build_tag(name, entry, registry)?);
    }
    Ok(defs)
}

fn build_tag(name: String, entry: TagEntry, registry: &RunnerRegistry) -> Result<TagDef, ConfigError> {
    let runner = registry
        .get(&entry.runner)
        .map_err(|_| ConfigError::UnknownRunner {
            tag: name.clone(),
            runner: entry.runner.clone(),
        })?;

    let mut def = TagDef::new(name.clone(), runner);
    if let Some(kind) = entry.kind {
        def = def.with_kind(kind);
    }
    def.vars = entry.vars;
    def.subtags = entry
        .subtags
        .into_iter()
        .map(|(sub, vars)| (sub, SubTag { vars }))
        .collect();
    for arg in entry.args {
        let mut spec = TagArg::new(arg.var, arg.mandatory);
        if let Some(pattern) = arg.format {
            let anchored = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                ConfigError::InvalidPattern {
                    tag: name.clone(),
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }
            })?;
            spec = spec.with_format(anchored);
        }
        def = def.with_arg(spec);
    }
    def.value = ValueSlot::from_spec(entry.value.as_deref());
    def.output = entry.output;
    def.accumulate = entry.accumulate;
    def.requires = entry.requires;
    Ok(def)
}
