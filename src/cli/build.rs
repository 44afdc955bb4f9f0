//! `vdf build`: processes a source and saves its output files

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::output::Output;
use super::Session;
use crate::storage::{ArtifactWriter, MANIFEST_FILE};

/// Command-line overrides of the `[output]` config
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub out: Option<PathBuf>,
    pub branch: Option<String>,
    pub save_maps: bool,
    pub spec_version: Option<String>,
}

pub fn run(output: &Output, session: &Session, source: &Path, options: BuildOptions) -> Result<()> {
    let processed = session.process(source, options.spec_version.as_deref())?;
    let doc = &processed.document;
    output.verbose_ctx(
        "build",
        &format!(
            "Processed {} cells into {} branches",
            processed.stages.len(),
            doc.branch_names().len()
        ),
    );

    let branch = options
        .branch
        .unwrap_or_else(|| doc.default_branch().to_string());
    let mut context = doc
        .current_context(&branch)
        .with_context(|| format!("Cannot build branch '{}'", branch))?;

    let settings = &session.config.project.output;
    for path in context.files.paths() {
        if let Some(file) = context.files.get_mut(&path) {
            file.set_eol(settings.eol.clone());
        }
    }

    let dir = match options.out {
        Some(dir) => dir,
        None => session.config.output_dir(),
    };
    let writer = ArtifactWriter::new(
        dir,
        settings.library.clone(),
        settings.save_maps && options.save_maps,
    );
    output.verbose_ctx("build", &format!("Writing to {}", writer.dir().display()));

    let manifest = writer.save_all(&context, &branch)?;

    if output.is_json() {
        output.data(&manifest);
    } else {
        for entry in &manifest.files {
            println!("{:<3} {:<30} {} lines", entry.order, entry.path, entry.lines);
        }
        output.success(&format!(
            "Built {} file(s) from branch '{}' into {} ({})",
            manifest.files.len(),
            branch,
            writer.dir().display(),
            MANIFEST_FILE
        ));
    }
    Ok(())
}
