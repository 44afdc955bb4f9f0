//! `vdf parse`: lists the cells of a source

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use super::output::Output;
use super::Session;
use crate::domain::{Cell, CellKind};

#[derive(Debug, Serialize)]
struct CellSummary {
    index: usize,
    kind: CellKind,
    location: String,
    name: String,
    hash: String,
    lines: usize,
    /// First line of a code cell's directive block
    #[serde(skip_serializing_if = "Option::is_none")]
    directive: Option<String>,
}

impl CellSummary {
    fn new(index: usize, cell: &Cell) -> Self {
        let directive = match cell.kind() {
            CellKind::Code => cell
                .directive_block()
                .and_then(|f| f.inner_lines().first())
                .map(|l| l.text().to_string()),
            _ => None,
        };
        Self {
            index,
            kind: cell.kind(),
            location: cell.location().to_string(),
            name: cell.name(),
            hash: cell.hash().to_string(),
            lines: cell.flat_lines().count(),
            directive,
        }
    }
}

pub fn run(output: &Output, session: &Session, source: &Path) -> Result<()> {
    let doc = session.open(source)?;
    output.verbose_ctx(
        "parse",
        &format!("Lexed {} cells from {}", doc.source().len(), source.display()),
    );

    let cells: Vec<CellSummary> = doc
        .source()
        .iter()
        .enumerate()
        .map(|(i, c)| CellSummary::new(i, c))
        .collect();

    if output.is_json() {
        output.data(&serde_json::json!({
            "source": source.display().to_string(),
            "frontmatter": doc.frontmatter().map(|c| c.location().to_string()),
            "cells": cells,
        }));
        return Ok(());
    }

    if let Some(frontmatter) = doc.frontmatter() {
        println!("Frontmatter at {}", frontmatter.location());
    }
    if cells.is_empty() {
        println!("No cells.");
        return Ok(());
    }
    println!("{:<4} {:<5} {:<20} {:<34} DIRECTIVE", "#", "KIND", "LOCATION", "HASH");
    println!("{}", "-".repeat(80));
    for cell in &cells {
        println!(
            "{:<4} {:<5} {:<20} {:<34} {}",
            cell.index,
            cell.kind.to_string(),
            cell.location,
            cell.hash,
            cell.directive.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
