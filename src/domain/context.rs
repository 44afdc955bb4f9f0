//! Run contexts
//!
//! A [`RunContext`] is the state a cell sees while it is processed: output
//! files, variables, tag-defined document attributes and the spec version.
//! All collections are persistent (`im`), so copying a context is cheap and a
//! copy never observes later changes to the original.

use im::OrdMap;
use serde::Serialize;
use serde_json::Value;

use super::file::Files;

/// Spec version used when neither frontmatter nor caller override it
pub const SPEC_VERSION: &str = "0.1";

/// Named values with persistent storage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValueMap(OrdMap<String, Value>);

/// Document variables
pub type Vars = ValueMap;

/// Tag-defined document attributes
///
/// The set of keys is fixed when a document is initialized from the runners'
/// defaults; frontmatter and `attr` tags only change values.
pub type Attrs = ValueMap;

impl ValueMap {
    pub fn new() -> Self {
        Self(OrdMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String value, if it is a non-empty string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Context snapshot visible to a cell
#[derive(Debug, Clone)]
pub struct RunContext {
    pub files: Files,
    pub vars: Vars,
    pub attrs: Attrs,
    pub spec_version: String,
}

impl RunContext {
    pub fn new(spec_version: impl Into<String>) -> Self {
        Self {
            files: Files::new(),
            vars: Vars::new(),
            attrs: Attrs::new(),
            spec_version: spec_version.into(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(SPEC_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn copies_are_independent() {
        let mut original = RunContext::default();
        original.vars.set("width", 8);

        let mut copy = original.clone();
        copy.vars.set("width", 16);
        copy.attrs.set("language", "verilog");

        assert_eq!(original.vars.get("width"), Some(&json!(8)));
        assert!(original.attrs.is_empty());
        assert_eq!(copy.vars.get("width"), Some(&json!(16)));
    }

    #[test]
    fn get_str_skips_empty_and_non_strings() {
        let mut attrs = Attrs::new();
        attrs.set("empty", "");
        attrs.set("number", 3);
        attrs.set("language", "vhdl");

        assert_eq!(attrs.get_str("empty"), None);
        assert_eq!(attrs.get_str("number"), None);
        assert_eq!(attrs.get_str("language"), Some("vhdl"));
    }

    #[test]
    fn value_maps_serialize_as_plain_objects() {
        let mut attrs: Attrs = ValueMap::new();
        attrs.set("language", "vhdl");
        let mut vars: Vars = attrs.clone();
        vars.set("width", 8);

        assert_eq!(serde_json::to_value(&attrs).unwrap(), json!({"language": "vhdl"}));
        assert_eq!(
            serde_json::to_value(&vars).unwrap(),
            json!({"language": "vhdl", "width": 8})
        );
    }
}
