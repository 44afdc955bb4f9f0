//! Tag application phases
//!
//! Every tag attached to a cell gets a call per phase. All handlers of one
//! phase run before any handler of the next one.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Vars,
    Cond,
    Subst,
    Externals,
    Target,
    Convert,
    Attrs,
    Pre,
    Code,
    Post,
    Show,
    Finalize,
}

impl Phase {
    /// Global application order
    pub const ORDER: [Phase; 12] = [
        Phase::Vars,
        Phase::Cond,
        Phase::Subst,
        Phase::Externals,
        Phase::Target,
        Phase::Convert,
        Phase::Attrs,
        Phase::Pre,
        Phase::Code,
        Phase::Post,
        Phase::Show,
        Phase::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Vars => "vars",
            Phase::Cond => "cond",
            Phase::Subst => "subst",
            Phase::Externals => "exts",
            Phase::Target => "targ",
            Phase::Convert => "conv",
            Phase::Attrs => "attr",
            Phase::Pre => "pre",
            Phase::Code => "code",
            Phase::Post => "post",
            Phase::Show => "show",
            Phase::Finalize => "fin",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_sorted_and_complete() {
        let mut sorted = Phase::ORDER;
        sorted.sort();
        assert_eq!(sorted, Phase::ORDER);
        assert_eq!(Phase::ORDER.first(), Some(&Phase::Vars));
        assert_eq!(Phase::ORDER.last(), Some(&Phase::Finalize));
    }

    #[test]
    fn short_names() {
        assert_eq!(Phase::Externals.to_string(), "exts");
        assert_eq!(Phase::Code.to_string(), "code");
    }
}
