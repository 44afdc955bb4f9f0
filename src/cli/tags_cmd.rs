//! `vdf tags`: lists the tag table

use anyhow::Result;
use serde::Serialize;

use super::output::Output;
use super::Session;
use crate::domain::tags::{TagDef, ValueSlot};

#[derive(Debug, Serialize)]
struct TagSummary {
    name: String,
    kind: String,
    runner: &'static str,
    args: Vec<String>,
    subtags: Vec<String>,
    value: Option<String>,
    accumulate: bool,
}

impl From<&TagDef> for TagSummary {
    fn from(def: &TagDef) -> Self {
        let args = def
            .args
            .iter()
            .map(|a| {
                if a.mandatory {
                    a.var_name.clone()
                } else {
                    format!("[{}]", a.var_name)
                }
            })
            .collect();
        let value = match &def.value {
            ValueSlot::None => None,
            ValueSlot::Optional(name) => Some(format!("[{name}]")),
            ValueSlot::Required(name) => Some(name.clone()),
        };
        Self {
            name: def.name.clone(),
            kind: def.kind.clone(),
            runner: def.runner.id(),
            args,
            subtags: def.subtags.keys().cloned().collect(),
            value,
            accumulate: def.accumulate,
        }
    }
}

impl TagSummary {
    /// Usage line, e.g. `#code[-new|replace]-[section]`
    fn usage(&self) -> String {
        let mut usage = format!("#{}", self.name);
        if !self.subtags.is_empty() {
            usage.push_str(&format!("[-{}]", self.subtags.join("|")));
        }
        for arg in &self.args {
            usage.push('-');
            usage.push_str(arg);
        }
        if let Some(value) = &self.value {
            usage.push_str("--");
            usage.push_str(value);
        }
        usage
    }
}

pub fn run(output: &Output, session: &Session) -> Result<()> {
    let tags: Vec<TagSummary> = session
        .processor
        .catalog()
        .tags
        .iter()
        .map(|d| TagSummary::from(d.as_ref()))
        .collect();
    output.verbose_ctx("tags", &format!("{} tags loaded", tags.len()));

    if output.is_json() {
        output.data(&tags);
        return Ok(());
    }

    println!("{:<10} {:<8} {:<8} USAGE", "TAG", "KIND", "RUNNER");
    println!("{}", "-".repeat(60));
    for tag in &tags {
        println!(
            "{:<10} {:<8} {:<8} {}",
            tag.name,
            tag.kind,
            tag.runner,
            tag.usage()
        );
    }
    Ok(())
}
