//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `parse <src>` | list the cells of a source (kind, location, name, hash) |
//! | `build <src>` | process a source, save output files, maps and `build.json` |
//! | `history <src>` | process a source, list branches and named cells |
//! | `tags` | list the tag table |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! The default comes from `default_format` in the global config.
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output; it also raises the log level
//! to `debug` unless `RUST_LOG` is set:
//! ```bash
//! vdf --verbose build design.md
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod build;
mod history;
mod output;
mod parse;
mod tags_cmd;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};

use crate::domain::Document;
use crate::processor::{Processor, Stage};
use crate::storage::{Catalog, Config};

/// Configuration and processor shared by every command
pub(crate) struct Session {
    pub config: Config,
    pub processor: Processor,
}

impl Session {
    pub fn load() -> Result<Self> {
        let config = Config::load()?;
        let catalog = Catalog::load(&config)?;
        Ok(Self {
            config,
            processor: Processor::new(Arc::new(catalog)),
        })
    }

    /// Lexes a source into an unprocessed document
    pub fn open(&self, source: &Path) -> Result<Document> {
        self.processor
            .open(source, &self.config.project.document.default_branch)
    }

    /// Lexes and processes a source
    pub fn process(&self, source: &Path, spec_version: Option<&str>) -> Result<Processed> {
        let doc = self.open(source)?;
        let spec_version = spec_version.or(self.config.project.document.spec_version.as_deref());
        let stages = self.processor.process_doc(&doc, spec_version)?;
        let document = match stages.last() {
            Some(stage) => stage.document.clone(),
            None => self.processor.initialize_doc(&doc, spec_version)?,
        };
        Ok(Processed { document, stages })
    }
}

/// A processed source: the final document and every intermediate stage
pub(crate) struct Processed {
    pub document: Document,
    pub stages: Vec<Stage>,
}
