//! `vdf history`: branches and named cells of a processed source

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use super::output::Output;
use super::Session;

#[derive(Debug, Serialize)]
struct BranchSummary {
    name: String,
    parent: Option<String>,
    episodes: usize,
    files: Vec<String>,
}

#[derive(Debug, Serialize)]
struct NamedSummary {
    name: String,
    episode: String,
    location: String,
    stdout: Vec<String>,
}

pub fn run(output: &Output, session: &Session, source: &Path) -> Result<()> {
    let processed = session.process(source, None)?;
    let doc = &processed.document;

    let mut branches = Vec::new();
    for (name, story) in doc.stories() {
        let files = doc.current_context(name)?.files.paths();
        branches.push(BranchSummary {
            name: name.clone(),
            parent: story.parent.as_ref().map(ToString::to_string),
            episodes: story.arc.len(),
            files,
        });
    }

    let named: Vec<NamedSummary> = doc
        .named_episodes()
        .into_iter()
        .map(|e| NamedSummary {
            name: e.episode.cell.name(),
            episode: e.reference().to_string(),
            location: e.episode.location.to_string(),
            stdout: e.episode.cell.stdout().to_vec(),
        })
        .collect();

    if output.is_json() {
        output.data(&serde_json::json!({
            "default_branch": doc.default_branch(),
            "branches": branches,
            "named": named,
        }));
        return Ok(());
    }

    println!("Branches ({}):", branches.len());
    println!("{:<16} {:<16} {:<9} FILES", "NAME", "PARENT", "EPISODES");
    println!("{}", "-".repeat(60));
    for branch in &branches {
        println!(
            "{:<16} {:<16} {:<9} {}",
            branch.name,
            branch.parent.as_deref().unwrap_or("-"),
            branch.episodes,
            branch.files.join(", ")
        );
    }

    if !named.is_empty() {
        output.blank();
        println!("Named cells ({}):", named.len());
        for cell in &named {
            println!("  {:<16} {:<12} {}", cell.name, cell.episode, cell.location);
            for line in &cell.stdout {
                println!("    {}", line);
            }
        }
    }
    Ok(())
}
