//! Artifact output
//!
//! Every output file of a run context is saved as `<path>` plus, unless
//! disabled, `<path>.map` holding one JSON provenance record per line.
//! A `build.json` manifest lists the saved files in build order for the
//! HDL build step.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::{File, RunContext};

pub const MAP_SUFFIX: &str = ".map";
pub const MANIFEST_FILE: &str = "build.json";

/// One saved output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub kind: String,
    pub library: String,
    pub order: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub generated_at: DateTime<Utc>,
    pub spec_version: String,
    pub branch: String,
    pub files: Vec<ManifestEntry>,
}

/// Writes rendered files into an output directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    library: String,
    save_maps: bool,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, library: impl Into<String>, save_maps: bool) -> Self {
        Self {
            dir: dir.into(),
            library: library.into(),
            save_maps,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Renders and saves one file, returning the number of lines written
    pub fn save_file(&self, file: &File, context: &RunContext) -> Result<usize> {
        let (lines, map) = file
            .saves(context)
            .with_context(|| format!("Failed to render {}", file.path()))?;

        let path = self.dir.join(file.path());
        write_atomic(&path, &join_lines(&lines, file.eol()))?;
        if self.save_maps {
            let map_path = self.dir.join(format!("{}{}", file.path(), MAP_SUFFIX));
            write_atomic(&map_path, &join_lines(&map, file.eol()))?;
        }
        debug!(path = %path.display(), lines = lines.len(), "saved file");
        Ok(lines.len())
    }

    /// Saves every file of `context` and the build manifest
    pub fn save_all(&self, context: &RunContext, branch: &str) -> Result<BuildManifest> {
        let mut files: Vec<&File> = context.files.iter().collect();
        files.sort_by_key(|f| build_rank(f.kind()));

        let mut entries = Vec::with_capacity(files.len());
        for (order, file) in files.into_iter().enumerate() {
            let lines = self.save_file(file, context)?;
            entries.push(ManifestEntry {
                path: file.path(),
                kind: file.kind().to_string(),
                library: self.library.clone(),
                order,
                lines,
            });
        }

        let manifest = BuildManifest {
            generated_at: Utc::now(),
            spec_version: context.spec_version.clone(),
            branch: branch.to_string(),
            files: entries,
        };
        let json = serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
        write_atomic(&self.dir.join(MANIFEST_FILE), &format!("{json}\n"))?;
        Ok(manifest)
    }
}

/// Packages and headers compile before the units that use them
fn build_rank(kind: &str) -> u8 {
    if kind.ends_with("_package") || kind.ends_with("_header") {
        0
    } else {
        1
    }
}

fn join_lines(lines: &[String], eol: &str) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push_str(eol);
    }
    text
}

/// Writes through a temp file and a rename
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, content)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
