//! File rendering
//!
//! File templates are MiniJinja templates. A render sees:
//!
//! | Name                              | Value                                     |
//! |-----------------------------------|-------------------------------------------|
//! | `render_section(name[, margin])`  | the section's lines, each behind `margin` |
//! | `vars`                            | file variables (`subject` = file name)    |
//! | `global_vars`, `global_attrs`     | document variables and attributes         |
//! | `sections.name`                   | section text joined with newlines         |
//! | `str(v)`, `json(v)`, `yaml(v)`    | string and structured dumps               |
//!
//! Generated lines are templates too. Each one is rendered against the same
//! variables until it stops changing, before the file template runs.
//!
//! `render_section` tags every line it emits with an inline index marker.
//! After the template pass the markers are split back out into per-line
//! provenance; lines without one came from the template. A template line
//! that only rendered an empty section is dropped.

use minijinja::value::{Rest, Value};
use minijinja::{Environment, ErrorKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::context::{Attrs, RunContext, Vars};
use super::file::{File, Renderer, RAW_SECTION};
use super::location::Location;

/// Provenance record written for lines coming from the template itself
pub const TEMPLATE_MARKER: &str = "[[Template]]";

const SECTION_FN: &str = "render_section";
const MAX_PASSES: usize = 8;

/// Section line marker: `LINE_OPEN <index> LINE_CLOSE`
const LINE_OPEN: char = '\u{E000}';
const LINE_CLOSE: char = '\u{E001}';
/// Output of a section without lines
const EMPTY_SECTION: char = '\u{E002}';

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Template(#[from] minijinja::Error),

    #[error("Substitution does not settle for line '{line}'")]
    NoFixpoint { line: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// An output line with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLine {
    pub text: String,
    /// `None` for template lines
    pub provenance: Option<Vec<Location>>,
}

impl RenderedLine {
    /// Map record for this line
    pub fn map_entry(&self) -> Result<String, RenderError> {
        match &self.provenance {
            Some(chain) => Ok(serde_json::to_string(chain)?),
            None => Ok(TEMPLATE_MARKER.to_string()),
        }
    }
}

/// Splits rendered lines into final text lines and map records
pub fn finalize(rendered: &[RenderedLine]) -> Result<(Vec<String>, Vec<String>), RenderError> {
    let mut lines = Vec::with_capacity(rendered.len());
    let mut map = Vec::with_capacity(rendered.len());
    for line in rendered {
        lines.push(line.text.clone());
        map.push(line.map_entry()?);
    }
    Ok((lines, map))
}

/// Template context
#[derive(Debug, Serialize)]
struct Data<'a> {
    vars: Vars,
    global_vars: &'a Vars,
    global_attrs: &'a Attrs,
    sections: BTreeMap<String, String>,
}

/// Section contents after substitution: (provenance index, text)
type SectionLines = BTreeMap<String, Vec<(usize, String)>>;

/// Renders a file against the document context
pub fn render_file(file: &File, context: &RunContext) -> Result<Vec<RenderedLine>, RenderError> {
    if file.is_raw_only() || file.spec().renderer == Renderer::Passthrough {
        return Ok(file
            .section_lines(RAW_SECTION)
            .into_iter()
            .map(|line| RenderedLine {
                text: strip_eol(line.content()).to_string(),
                provenance: Some(line.provenance().to_vec()),
            })
            .collect());
    }

    let mut vars = file.vars().clone();
    if !vars.contains("subject") {
        vars.set("subject", file.name());
    }
    let mut data = Data {
        vars,
        global_vars: &context.vars,
        global_attrs: &context.attrs,
        sections: BTreeMap::new(),
    };

    let line_env = line_environment();
    let mut provenance: Vec<Vec<Location>> = Vec::new();
    let mut sections = SectionLines::new();
    for name in &file.spec().sections {
        let mut lines = Vec::new();
        for generated in file.section_lines(name) {
            let text = settle(&line_env, strip_eol(generated.content()), &data)?;
            lines.push((provenance.len(), text));
            provenance.push(generated.provenance().to_vec());
        }
        sections.insert(name.clone(), lines);
    }
    data.sections = sections
        .iter()
        .map(|(name, lines)| {
            let text: Vec<&str> = lines.iter().map(|(_, t)| t.as_str()).collect();
            (name.clone(), text.join("\n"))
        })
        .collect();

    let env = template_environment(file.path(), sections);
    let output = env.render_str(&file.spec().template, &data)?;

    let mut rendered = Vec::new();
    for line in output.lines() {
        let (text, index) = split_markers(line);
        if index.is_none() && line.contains(EMPTY_SECTION) && text.trim().is_empty() {
            continue;
        }
        rendered.push(RenderedLine {
            text,
            provenance: index.and_then(|i| provenance.get(i).cloned()),
        });
    }
    Ok(rendered)
}

fn strip_eol(text: &str) -> &str {
    text.trim_end_matches(['\n', '\r'])
}

/// Environment shared by templates and generated lines
fn base_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_function("str", |value: Value| value.to_string());
    env.add_function("json", |value: Value| {
        serde_json::to_string(&value).map_err(dump_error)
    });
    env.add_function("yaml", |value: Value| {
        serde_yaml::to_string(&value)
            .map(|text| text.trim_end().to_string())
            .map_err(dump_error)
    });
    env
}

fn dump_error(err: impl fmt::Display) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, err.to_string())
}

fn line_environment() -> Environment<'static> {
    let mut env = base_environment();
    env.add_function(
        SECTION_FN,
        |_: Rest<Value>| -> Result<String, minijinja::Error> {
            Err(minijinja::Error::new(
                ErrorKind::InvalidOperation,
                "section rendering is only allowed in templates",
            ))
        },
    );
    env
}

fn template_environment(path: String, sections: SectionLines) -> Environment<'static> {
    let mut env = base_environment();
    env.add_function(SECTION_FN, move |name: String, margin: Option<Value>| {
        render_section(&path, &sections, &name, margin)
    });
    env
}

/// Marked section lines; a margin is either a string or a number of spaces
fn render_section(
    path: &str,
    sections: &SectionLines,
    name: &str,
    margin: Option<Value>,
) -> Result<String, minijinja::Error> {
    let lines = sections.get(name).ok_or_else(|| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("no section '{name}' in file '{path}'"),
        )
    })?;
    if lines.is_empty() {
        return Ok(EMPTY_SECTION.to_string());
    }

    let margin = match margin {
        None => String::new(),
        Some(value) => match value.as_str() {
            Some(text) => text.to_string(),
            None => " ".repeat(usize::try_from(value.clone())?),
        },
    };
    let marked: Vec<String> = lines
        .iter()
        .map(|(index, text)| format!("{margin}{LINE_OPEN}{index}{LINE_CLOSE}{text}"))
        .collect();
    Ok(marked.join("\n"))
}

/// Renders a generated line until it stops changing
fn settle(env: &Environment<'_>, content: &str, data: &Data<'_>) -> Result<String, RenderError> {
    let mut text = content.to_string();
    for _ in 0..MAX_PASSES {
        if !["{{", "{%", "{#"].iter().any(|open| text.contains(open)) {
            return Ok(text);
        }
        let next = env.render_str(&text, data)?;
        if next == text {
            return Ok(text);
        }
        text = next;
    }
    Err(RenderError::NoFixpoint {
        line: content.to_string(),
    })
}

/// Line text without markers, plus the index of the first line marker
fn split_markers(line: &str) -> (String, Option<usize>) {
    let mut text = String::with_capacity(line.len());
    let mut index = None;
    let mut rest = line;
    while let Some(start) = rest.find(LINE_OPEN) {
        text.push_str(&rest[..start]);
        let after = &rest[start + LINE_OPEN.len_utf8()..];
        match after.split_once(LINE_CLOSE) {
            Some((digits, tail)) => {
                if index.is_none() {
                    index = digits.parse().ok();
                }
                rest = tail;
            }
            None => rest = after,
        }
    }
    text.push_str(rest);
    text.retain(|c| c != EMPTY_SECTION);
    (text, index)
}
