//! Hierarchical source locations
//!
//! A location is a path of components such as `["doc.md", 12]`: the source
//! file followed by the line index. Cells use the location of their first
//! block, generated lines carry a chain of locations (their provenance).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One component of a location path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocPart {
    Index(usize),
    Name(String),
}

impl fmt::Display for LocPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocPart::Index(idx) => write!(f, "{}", idx),
            LocPart::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<usize> for LocPart {
    fn from(idx: usize) -> Self {
        LocPart::Index(idx)
    }
}

impl From<&str> for LocPart {
    fn from(name: &str) -> Self {
        LocPart::Name(name.to_string())
    }
}

impl From<String> for LocPart {
    fn from(name: String) -> Self {
        LocPart::Name(name)
    }
}

/// A location path, e.g. `doc.md:12`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(Vec<LocPart>);

impl Location {
    /// Creates an empty location
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a single-component location naming a source
    pub fn named(name: impl Into<String>) -> Self {
        Self(vec![LocPart::Name(name.into())])
    }

    /// Returns a new location with `part` appended
    pub fn child(&self, part: impl Into<LocPart>) -> Self {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Self(parts)
    }

    pub fn parts(&self) -> &[LocPart] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "Undefined");
        }
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl<P: Into<LocPart>> FromIterator<P> for Location {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_parts() {
        let loc = Location::named("doc.md").child(3usize);
        assert_eq!(loc.to_string(), "doc.md:3");
    }

    #[test]
    fn empty_location_is_undefined() {
        assert_eq!(Location::new().to_string(), "Undefined");
    }

    #[test]
    fn child_does_not_touch_parent() {
        let parent = Location::named("doc.md");
        let child = parent.child(1usize);
        assert_eq!(parent.parts().len(), 1);
        assert_eq!(child.parts().len(), 2);
    }

    #[test]
    fn serializes_as_flat_array() {
        let loc = Location::named("doc.md").child(7usize);
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, r#"["doc.md",7]"#);

        let back: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loc);
    }
}
