//! Document frontmatter
//!
//! The frontmatter cell holds a YAML block between `---` lines:
//!
//! ```yaml
//! ---
//! vdf: "0.1"          # spec version
//! vars: {width: 8}    # initial document variables
//! attrs: {language: verilog}
//! tags:               # inline tag table, merged over the built-in one
//!   note: {runner: show, value: "?path"}
//! ---
//! ```
//!
//! Unknown top-level keys are ignored so documents can carry their own
//! metadata (title, authors).

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::Cell;

const DELIMITER: &str = "---";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Frontmatter {
    /// Spec version; a number is accepted as well as a string
    pub vdf: Option<serde_yaml::Value>,
    pub vars: Map<String, Value>,
    pub attrs: Map<String, Value>,
    pub tags: Option<serde_yaml::Value>,
}

impl Frontmatter {
    /// Reads the YAML between the first two delimiter lines of `cell`
    pub fn from_cell(cell: &Cell) -> Result<Self, serde_yaml::Error> {
        let yaml = Self::yaml_text(cell);
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&yaml)
    }

    fn yaml_text(cell: &Cell) -> String {
        let lines = cell
            .flat_lines()
            .skip_while(|l| l.content.trim() != DELIMITER)
            .skip(1);
        let mut yaml = String::new();
        for line in lines {
            if line.content.trim() == DELIMITER {
                break;
            }
            yaml.push_str(&line.content);
        }
        yaml
    }

    /// Spec version as text
    pub fn spec_version(&self) -> Option<String> {
        match self.vdf.as_ref()? {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Block, Line, Location};

    fn cell(lines: &[&str]) -> Cell {
        let src = Location::named("doc.vdf");
        let blocks = lines
            .iter()
            .enumerate()
            .map(|(i, l)| Block::Line(Line::new(i, format!("{l}\n"), &src)))
            .collect();
        Cell::raw(blocks, src.child(0usize))
    }

    #[test]
    fn reads_yaml_between_delimiters() {
        let fm = Frontmatter::from_cell(&cell(&[
            "",
            "---",
            "vdf: 0.1",
            "title: Counter",
            "vars:",
            "  width: 8",
            "attrs:",
            "  language: verilog",
            "---",
            "ignored: true",
        ]))
        .unwrap();

        assert_eq!(fm.spec_version().as_deref(), Some("0.1"));
        assert_eq!(fm.vars.get("width"), Some(&Value::from(8)));
        assert_eq!(fm.attrs.get("language"), Some(&Value::from("verilog")));
        assert!(fm.tags.is_none());
    }

    #[test]
    fn empty_frontmatter_is_default() {
        let fm = Frontmatter::from_cell(&cell(&["---", "---"])).unwrap();
        assert!(fm.vars.is_empty());
        assert_eq!(fm.spec_version(), None);
    }

    #[test]
    fn malformed_yaml_fails() {
        assert!(Frontmatter::from_cell(&cell(&["---", "vars: [1, 2", "---"])).is_err());
    }
}
