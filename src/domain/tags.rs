//! Tag grammar
//!
//! Directives live on the first content line of a code cell's fenced block:
//!
//! ```text
//! #code-section:content:new #name--counter
//! ```
//!
//! A tag token is `#` followed by hyphen-joined segments:
//!
//! | Part       | Form                      | Example              |
//! |------------|---------------------------|----------------------|
//! | tag name   | longest known prefix      | `code`               |
//! | subtag     | longest known prefix      | `new`                |
//! | positional | bare segment              | `counter`            |
//! | keyword    | `name:value`              | `section:content`    |
//! | value      | everything after `--`     | `--the value`        |
//!
//! `\-` is a literal hyphen inside a segment.

use regex::Regex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

use crate::runner::TagRunner;
use crate::source::escape;

/// Marker introducing a tag
pub const TAG_MARKER: char = '#';

/// Fence kind marking a directive block
pub const DIRECTIVE_KIND: &str = "vdf";

/// Fence kind suffix marking a language-specific directive block
pub const DIRECTIVE_SUFFIX: &str = "-vdf";

/// Preamble of a directive line inside a plain fence
pub const DIRECTIVE_PREAMBLE: &str = "%%vdf";

/// Tag kinds whose instances carry the cell's name, parent and branch
pub const KIND_NAME: &str = "name";
pub const KIND_PARENT: &str = "parent";
pub const KIND_BRANCH: &str = "branch";

const OPTIONAL_VALUE_PREFIX: char = '?';
const SEGMENT_SEPARATOR: char = '-';
const KEYWORD_SEPARATOR: char = ':';

#[derive(Debug, Error, PartialEq)]
pub enum TagError {
    #[error("No tag definition matches '{line}'")]
    UnknownTag { line: String },

    #[error("Variable '{name}' is not declared for the tag (line '{line}')")]
    UnknownVariable { name: String, line: String },

    #[error("Variable '{name}' is already set for the tag (line '{line}')")]
    DuplicateVariable { name: String, line: String },

    #[error("Got bare segment '{segment}' where '<name>:<value>' is expected (line '{line}')")]
    BareAfterKeyword { segment: String, line: String },

    #[error("Mandatory argument #{index} is missing (line '{line}')")]
    MissingArgument { index: usize, line: String },

    #[error("Argument #{index} does not match its format (line '{line}')")]
    ArgumentFormat { index: usize, line: String },

    #[error("Tag takes no value (line '{line}')")]
    ValueNotSupported { line: String },

    #[error("Tag requires a value (line '{line}')")]
    ValueMissing { line: String },

    #[error("Variable '{name}' has no value and no default (line '{line}')")]
    MissingVariable { name: String, line: String },

    #[error("Extra data '{extra}' (line '{line}')")]
    ExtraData { extra: String, line: String },

    #[error("Directive continues past the end of the block (line '{line}')")]
    UnterminatedDirective { line: String },

    #[error("Tag '{name}' may appear only once per cell (line '{line}')")]
    DuplicateTag { name: String, line: String },

    #[error("Tag '{name}' requires tag '{requires}' (line '{line}')")]
    MissingCoTag {
        name: String,
        requires: String,
        line: String,
    },
}

/// Positional argument declaration
#[derive(Debug, Clone)]
pub struct TagArg {
    pub var_name: String,
    pub mandatory: bool,
    /// Anchored pattern the segment must match
    pub format: Option<Regex>,
}

impl TagArg {
    pub fn new(var_name: impl Into<String>, mandatory: bool) -> Self {
        Self {
            var_name: var_name.into(),
            mandatory,
            format: None,
        }
    }

    pub fn with_format(mut self, format: Regex) -> Self {
        self.format = Some(format);
        self
    }

    fn accepts(&self, segment: &str) -> bool {
        self.format.as_ref().map_or(true, |re| re.is_match(segment))
    }
}

/// Subtag declaration: variable bindings applied when the subtag matches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubTag {
    pub vars: BTreeMap<String, String>,
}

/// Trailing value slot
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ValueSlot {
    #[default]
    None,
    Optional(String),
    Required(String),
}

impl ValueSlot {
    /// Reads a table declaration; a `?` prefix marks the value optional
    pub fn from_spec(spec: Option<&str>) -> Self {
        match spec {
            None => ValueSlot::None,
            Some(s) => match s.strip_prefix(OPTIONAL_VALUE_PREFIX) {
                Some(rest) => ValueSlot::Optional(rest.to_string()),
                None => ValueSlot::Required(s.to_string()),
            },
        }
    }
}

/// Static tag definition
#[derive(Debug, Clone)]
pub struct TagDef {
    pub name: String,
    pub kind: String,
    pub runner: Arc<dyn TagRunner>,
    /// Declared variables; `None` means no default
    pub vars: BTreeMap<String, Option<String>>,
    pub subtags: BTreeMap<String, SubTag>,
    pub args: Vec<TagArg>,
    pub value: ValueSlot,
    /// Output sections
    pub output: Vec<String>,
    /// May appear more than once per cell
    pub accumulate: bool,
    /// Co-tags that must be present in the same cell
    pub requires: Vec<String>,
}

impl TagDef {
    pub fn new(name: impl Into<String>, runner: Arc<dyn TagRunner>) -> Self {
        let name = name.into();
        Self {
            kind: name.clone(),
            name,
            runner,
            vars: BTreeMap::new(),
            subtags: BTreeMap::new(),
            args: Vec::new(),
            value: ValueSlot::None,
            output: Vec::new(),
            accumulate: false,
            requires: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, default: Option<&str>) -> Self {
        self.vars.insert(name.into(), default.map(str::to_string));
        self
    }

    pub fn with_subtag(mut self, name: impl Into<String>, vars: &[(&str, &str)]) -> Self {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.subtags.insert(name.into(), SubTag { vars });
        self
    }

    pub fn with_arg(mut self, arg: TagArg) -> Self {
        self.vars.entry(arg.var_name.clone()).or_insert(None);
        self.args.push(arg);
        self
    }

    pub fn with_value(mut self, value: ValueSlot) -> Self {
        self.value = value;
        self
    }

    pub fn with_output(mut self, sections: &[&str]) -> Self {
        self.output = sections.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn accumulating(mut self) -> Self {
        self.accumulate = true;
        self
    }

    pub fn with_requires(mut self, tags: &[&str]) -> Self {
        self.requires = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    fn declares(&self, subtag: Option<&SubTag>, name: &str) -> bool {
        self.vars.contains_key(name) || subtag.is_some_and(|s| s.vars.contains_key(name))
    }
}

/// Parsed tag occurrence
#[derive(Debug, Clone)]
pub struct TagInstance {
    pub def: Arc<TagDef>,
    /// Tag text without the marker
    pub line: String,
    pub subtag: Option<String>,
    pub vars: BTreeMap<String, String>,
    pub args: Vec<String>,
    pub value: Option<String>,
}

impl TagInstance {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn kind(&self) -> &str {
        &self.def.kind
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Value, falling back to the `id` variable; empty strings count as unset
    fn id(&self) -> Option<&str> {
        self.value
            .as_deref()
            .or_else(|| self.var("id"))
            .filter(|s| !s.is_empty())
    }
}

/// Tags of one cell
#[derive(Debug, Clone, Default)]
pub struct TagsInstances {
    tags: Vec<TagInstance>,
    consumed: usize,
}

impl TagsInstances {
    pub fn new(tags: Vec<TagInstance>, consumed: usize) -> Self {
        Self { tags, consumed }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagInstance> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Physical lines taken by the directive
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    fn by_kind(&self, kind: &str) -> Option<&str> {
        self.tags
            .iter()
            .filter(|t| t.kind() == kind)
            .find_map(TagInstance::id)
    }

    /// Explicit cell name
    pub fn name(&self) -> Option<&str> {
        self.by_kind(KIND_NAME)
    }

    /// Explicit parent cell name
    pub fn parent(&self) -> Option<&str> {
        self.by_kind(KIND_PARENT)
    }

    /// Explicit branch name
    pub fn branch(&self) -> Option<&str> {
        self.by_kind(KIND_BRANCH)
    }
}

/// Tag definition table
#[derive(Debug, Clone, Default)]
pub struct TagDefs {
    defs: BTreeMap<String, Arc<TagDef>>,
}

impl TagDefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, def: TagDef) {
        self.defs.insert(def.name.clone(), Arc::new(def));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TagDef>> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TagDef>> {
        self.defs.values()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Table with `other`'s definitions added, replacing same-named ones
    pub fn merged(&self, other: &TagDefs) -> TagDefs {
        let mut defs = self.defs.clone();
        defs.extend(other.defs.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
        TagDefs { defs }
    }

    /// Parses a single tag token (marker already removed)
    pub fn parse_tag(&self, text: &str) -> Result<TagInstance, TagError> {
        let line = text.to_string();
        let items = split_segments(text);

        let (def, taken) = (1..=items.len())
            .rev()
            .find_map(|n| self.defs.get(&items[..n].join("-")).map(|d| (d, n)))
            .ok_or_else(|| TagError::UnknownTag { line: line.clone() })?;
        let mut data: VecDeque<String> = items[taken..].iter().cloned().collect();

        let mut vars = BTreeMap::new();
        let mut subtag_name = None;
        let mut subtag = None;
        if !def.subtags.is_empty() {
            let items: Vec<String> = data.iter().cloned().collect();
            let found = (1..=items.len())
                .rev()
                .find_map(|n| {
                    let key = items[..n].join("-");
                    def.subtags.get(&key).map(|s| (key, s, n))
                });
            if let Some((key, sub, n)) = found {
                data.drain(..n);
                for (name, value) in &sub.vars {
                    bind(def, Some(sub), &mut vars, name, value, &line)?;
                }
                subtag_name = Some(key);
                subtag = Some(sub);
            }
        }

        let mut args_spec: VecDeque<&TagArg> = def.args.iter().collect();
        let mut args = Vec::new();
        let mut value = None;
        let mut keyword = false;
        let mut index = 0;

        loop {
            let segment = data.pop_front();
            match segment.as_deref() {
                Some("") => {
                    if !data.is_empty() {
                        if def.value == ValueSlot::None {
                            return Err(TagError::ValueNotSupported { line });
                        }
                        value = Some(Vec::from(std::mem::take(&mut data)).join("-"));
                    }
                    break;
                }
                None if keyword => break,
                Some(s) if s.contains(KEYWORD_SEPARATOR) => {
                    keyword = true;
                    let (name, v) = s.split_once(KEYWORD_SEPARATOR).unwrap_or((s, ""));
                    bind(def, subtag, &mut vars, name, v, &line)?;
                    continue;
                }
                Some(s) if keyword => {
                    return Err(TagError::BareAfterKeyword {
                        segment: s.to_string(),
                        line,
                    });
                }
                _ => {}
            }

            let Some(spec) = args_spec.pop_front() else {
                if let Some(s) = segment {
                    data.push_front(s);
                }
                break;
            };
            index += 1;

            let Some(segment) = segment else {
                if spec.mandatory {
                    return Err(TagError::MissingArgument { index, line });
                }
                break;
            };

            if spec.accepts(&segment) {
                bind(def, subtag, &mut vars, &spec.var_name, &segment, &line)?;
                args.push(segment);
            } else if spec.mandatory {
                return Err(TagError::ArgumentFormat { index, line });
            } else {
                data.push_front(segment);
            }
        }

        if !data.is_empty() {
            return Err(TagError::ExtraData {
                extra: Vec::from(data).join("-"),
                line,
            });
        }

        if matches!(def.value, ValueSlot::Required(_)) && value.is_none() {
            return Err(TagError::ValueMissing { line });
        }

        for (name, default) in &def.vars {
            if vars.contains_key(name) {
                continue;
            }
            match default {
                Some(d) => {
                    vars.insert(name.clone(), d.clone());
                }
                None => {
                    return Err(TagError::MissingVariable {
                        name: name.clone(),
                        line,
                    })
                }
            }
        }

        Ok(TagInstance {
            def: Arc::clone(def),
            line,
            subtag: subtag_name,
            vars,
            args,
            value,
        })
    }

    /// Parses the directive at the start of `lines`
    ///
    /// The directive line may continue over several physical lines. Lines
    /// that do not start with the tag marker carry no directive.
    pub fn parse_tags(&self, lines: &[&str]) -> Result<TagsInstances, TagError> {
        let Some(first) = lines.first() else {
            return Ok(TagsInstances::default());
        };
        let first = first.strip_prefix(DIRECTIVE_PREAMBLE).unwrap_or(first);
        if !first.trim_start().starts_with(TAG_MARKER) {
            return Ok(TagsInstances::default());
        }

        let mut directive = String::new();
        let mut consumed = 0;
        loop {
            let Some(line) = lines.get(consumed) else {
                return Err(TagError::UnterminatedDirective { line: directive });
            };
            let line = if consumed == 0 { first } else { line };
            consumed += 1;
            directive.push_str(line.trim_end_matches(['\n', '\r']));
            if escape::ends_with_unescaped(&directive, escape::DEFAULT_ESCAPE) {
                directive.pop();
            } else {
                break;
            }
        }

        let tags = split_tags(&directive)
            .iter()
            .map(|text| self.parse_tag(text))
            .collect::<Result<Vec<_>, _>>()?;

        for tag in &tags {
            if !tag.def.accumulate && tags.iter().filter(|t| t.name() == tag.name()).count() > 1 {
                return Err(TagError::DuplicateTag {
                    name: tag.name().to_string(),
                    line: directive.clone(),
                });
            }
            for required in &tag.def.requires {
                if !tags.iter().any(|t| t.name() == required) {
                    return Err(TagError::MissingCoTag {
                        name: tag.name().to_string(),
                        requires: required.clone(),
                        line: directive.clone(),
                    });
                }
            }
        }

        Ok(TagsInstances { tags, consumed })
    }
}

fn bind(
    def: &TagDef,
    subtag: Option<&SubTag>,
    vars: &mut BTreeMap<String, String>,
    name: &str,
    value: &str,
    line: &str,
) -> Result<(), TagError> {
    if !def.declares(subtag, name) {
        return Err(TagError::UnknownVariable {
            name: name.to_string(),
            line: line.to_string(),
        });
    }
    if vars.contains_key(name) {
        return Err(TagError::DuplicateVariable {
            name: name.to_string(),
            line: line.to_string(),
        });
    }
    vars.insert(name.to_string(), value.to_string());
    Ok(())
}

/// Splits a tag token on unescaped hyphens
fn split_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&SEGMENT_SEPARATOR) => {
                chars.next();
                current.push(SEGMENT_SEPARATOR);
            }
            SEGMENT_SEPARATOR => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Cuts a directive line into tag tokens, markers removed
///
/// A marker opens a tag at line start or after whitespace. Escaped characters
/// never open a tag.
fn split_tags(directive: &str) -> Vec<String> {
    let raw: Vec<char> = directive.chars().collect();
    let masked: Vec<char> = escape::mask_escaped(directive, escape::DEFAULT_ESCAPE, '_')
        .chars()
        .collect();

    let mut tags = Vec::new();
    let mut current: Option<String> = None;
    let mut prev: Option<char> = None;
    for (c, m) in raw.iter().zip(masked.iter()) {
        if *m == TAG_MARKER && prev.map_or(true, char::is_whitespace) {
            if let Some(text) = current.take() {
                tags.push(text.trim_end().to_string());
            }
            current = Some(String::new());
            prev = Some(*m);
            continue;
        }
        prev = Some(*m);
        if let Some(text) = current.as_mut() {
            text.push(*c);
        }
    }
    if let Some(text) = current {
        tags.push(text.trim_end().to_string());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::meta::MetaRunner;

    fn runner() -> Arc<dyn TagRunner> {
        Arc::new(MetaRunner)
    }

    fn defs() -> TagDefs {
        let mut defs = TagDefs::new();
        defs.insert(
            TagDef::new("code", runner())
                .with_var("section", Some(""))
                .with_var("action", Some("append"))
                .with_var("file", Some(""))
                .with_subtag("new", &[("action", "new")])
                .with_subtag("replace", &[("action", "replace")])
                .with_arg(TagArg::new("section", false))
                .with_output(&["content"])
                .accumulating(),
        );
        defs.insert(
            TagDef::new("name", runner())
                .with_var("id", Some(""))
                .with_arg(TagArg::new("id", false))
                .with_value(ValueSlot::from_spec(Some("?id"))),
        );
        defs.insert(
            TagDef::new("parent", runner())
                .with_var("id", Some(""))
                .with_arg(TagArg::new("id", false))
                .with_value(ValueSlot::from_spec(Some("?id"))),
        );
        defs.insert(
            TagDef::new("var", runner())
                .with_arg(TagArg::new("name", true))
                .with_value(ValueSlot::from_spec(Some("value")))
                .accumulating(),
        );
        defs.insert(
            TagDef::new("target", runner())
                .with_arg(TagArg::new("file", true))
                .with_arg(
                    TagArg::new("kind", false)
                        .with_format(Regex::new("^[a-z_]+$").unwrap()),
                )
                .with_var("kind", Some("")),
        );
        defs.insert(TagDef::new("show", runner()).with_value(ValueSlot::from_spec(Some("?path"))));
        defs.insert(
            TagDef::new("probe", runner())
                .with_requires(&["target"]),
        );
        defs
    }

    #[test]
    fn keyword_segments_bind_vars() {
        let tag = defs().parse_tag("code-section:body-action:new").unwrap();
        assert_eq!(tag.name(), "code");
        assert_eq!(tag.var("section"), Some("body"));
        assert_eq!(tag.var("action"), Some("new"));
        assert_eq!(tag.var("file"), Some(""));
        assert!(tag.args.is_empty());
        assert_eq!(tag.value, None);
    }

    #[test]
    fn unknown_variable_fails() {
        let err = defs().parse_tag("code-bogus:1").unwrap_err();
        assert_eq!(
            err,
            TagError::UnknownVariable {
                name: "bogus".into(),
                line: "code-bogus:1".into()
            }
        );
    }

    #[test]
    fn unknown_tag_fails() {
        assert!(matches!(
            defs().parse_tag("nosuch-tag").unwrap_err(),
            TagError::UnknownTag { .. }
        ));
    }

    #[test]
    fn keyword_splits_at_first_colon() {
        let tag = defs().parse_tag("code-section:content:new").unwrap();
        assert_eq!(tag.var("section"), Some("content:new"));
    }

    #[test]
    fn subtag_applies_its_vars() {
        let tag = defs().parse_tag("code-new-section:header").unwrap();
        assert_eq!(tag.subtag.as_deref(), Some("new"));
        assert_eq!(tag.var("action"), Some("new"));
        assert_eq!(tag.var("section"), Some("header"));
    }

    #[test]
    fn subtag_var_cannot_be_rebound() {
        let err = defs().parse_tag("code-new-action:append").unwrap_err();
        assert!(matches!(err, TagError::DuplicateVariable { .. }));
    }

    #[test]
    fn positional_argument_binds_var() {
        let tag = defs().parse_tag("code-header").unwrap();
        assert_eq!(tag.var("section"), Some("header"));
        assert_eq!(tag.args, vec!["header".to_string()]);
    }

    #[test]
    fn bare_segment_after_keyword_fails() {
        let err = defs().parse_tag("code-action:new-header").unwrap_err();
        assert!(matches!(err, TagError::BareAfterKeyword { .. }));
    }

    #[test]
    fn value_after_empty_segment() {
        let tag = defs().parse_tag("var-width--8-bit").unwrap();
        assert_eq!(tag.var("name"), Some("width"));
        assert_eq!(tag.value.as_deref(), Some("8-bit"));
    }

    #[test]
    fn required_value_missing_fails() {
        let err = defs().parse_tag("var-width").unwrap_err();
        assert_eq!(err, TagError::ValueMissing { line: "var-width".into() });
    }

    #[test]
    fn mandatory_argument_missing_fails() {
        let err = defs().parse_tag("var").unwrap_err();
        assert_eq!(err, TagError::MissingArgument { index: 1, line: "var".into() });
    }

    #[test]
    fn value_on_valueless_tag_fails() {
        let err = defs().parse_tag("code-header--text").unwrap_err();
        assert!(matches!(err, TagError::ValueNotSupported { .. }));
    }

    #[test]
    fn optional_value_may_be_absent() {
        let tag = defs().parse_tag("show").unwrap();
        assert_eq!(tag.value, None);
        let tag = defs().parse_tag("show--main.vhd").unwrap();
        assert_eq!(tag.value.as_deref(), Some("main.vhd"));
    }

    #[test]
    fn optional_argument_format_mismatch_is_extra_data() {
        let tag = defs().parse_tag("target-top-vhdl").unwrap();
        assert_eq!(tag.var("kind"), Some("vhdl"));

        let err = defs().parse_tag("target-top-V42").unwrap_err();
        assert_eq!(
            err,
            TagError::ExtraData {
                extra: "V42".into(),
                line: "target-top-V42".into()
            }
        );
    }

    #[test]
    fn leftover_segments_fail() {
        let err = defs().parse_tag("code-header-extra").unwrap_err();
        assert!(matches!(err, TagError::ExtraData { extra, .. } if extra == "extra"));
    }

    #[test]
    fn escaped_hyphen_stays_in_segment() {
        let tag = defs().parse_tag(r"name-my\-cell").unwrap();
        assert_eq!(tag.var("id"), Some("my-cell"));
    }

    #[test]
    fn directive_line_holds_several_tags() {
        let tags = defs()
            .parse_tags(&["#code-section:content #name--adder\n", "body\n"])
            .unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.consumed(), 1);
        assert_eq!(tags.name(), Some("adder"));
        assert_eq!(tags.parent(), None);
    }

    #[test]
    fn hash_inside_a_word_is_not_a_marker() {
        let tags = defs().parse_tags(&["#name-a#b\n"]).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.name(), Some("a#b"));
    }

    #[test]
    fn directive_continues_over_lines() {
        let tags = defs()
            .parse_tags(&["#code-section:content \\\n", "#parent-intro\n", "x;\n"])
            .unwrap();
        assert_eq!(tags.consumed(), 2);
        assert_eq!(tags.parent(), Some("intro"));
    }

    #[test]
    fn unterminated_directive_fails() {
        let err = defs().parse_tags(&["#code \\\n"]).unwrap_err();
        assert!(matches!(err, TagError::UnterminatedDirective { .. }));
    }

    #[test]
    fn preamble_is_stripped() {
        let tags = defs().parse_tags(&["%%vdf #name-top\n"]).unwrap();
        assert_eq!(tags.name(), Some("top"));
    }

    #[test]
    fn plain_first_line_carries_no_tags() {
        let tags = defs().parse_tags(&["foo();\n"]).unwrap();
        assert!(tags.is_empty());
        assert_eq!(tags.consumed(), 0);
    }

    #[test]
    fn non_accumulating_tag_only_once() {
        let err = defs().parse_tags(&["#name-a #name-b\n"]).unwrap_err();
        assert!(matches!(err, TagError::DuplicateTag { name, .. } if name == "name"));
    }

    #[test]
    fn required_co_tag_must_be_present() {
        let err = defs().parse_tags(&["#probe\n"]).unwrap_err();
        assert!(matches!(err, TagError::MissingCoTag { requires, .. } if requires == "target"));
        defs().parse_tags(&["#probe #target-top\n"]).unwrap();
    }

    #[test]
    fn merged_table_overrides_by_name() {
        let mut extra = TagDefs::new();
        extra.insert(TagDef::new("show", runner()));
        let merged = defs().merged(&extra);
        assert_eq!(merged.len(), defs().len());
        assert_eq!(merged.get("show").map(|d| d.value.clone()), Some(ValueSlot::None));
    }
}
