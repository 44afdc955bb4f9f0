//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{build, history, parse, tags_cmd, Session};

#[derive(Parser)]
#[command(name = "vdf")]
#[command(author, version, about = "Literate-programming document engine for HDL sources")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, else text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a source into cells
    Parse {
        /// Source file
        source: PathBuf,
    },

    /// Process a source and save its output files
    Build {
        /// Source file
        source: PathBuf,

        /// Output directory (defaults to `output.dir` from vdf.toml)
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Branch whose latest context is saved (defaults to the default branch)
        #[arg(long, short)]
        branch: Option<String>,

        /// Do not write `.map` provenance files
        #[arg(long)]
        no_maps: bool,

        /// Force the spec version
        #[arg(long, env = "VDF_SPEC_VERSION")]
        spec_version: Option<String>,
    },

    /// Process a source and show its branches and named cells
    History {
        /// Source file
        source: PathBuf,
    },

    /// List the tag table
    Tags,
}

/// Installs the tracing subscriber; `RUST_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let session = Session::load()?;
    let format = cli
        .format
        .unwrap_or_else(|| session.config.global.default_format.into());
    let output = Output::new(format, cli.verbose);

    output.verbose("vdf starting");
    if let Some(root) = &session.config.project_root {
        output.verbose(&format!("Project root: {}", root.display()));
    }

    match cli.command {
        Commands::Parse { source } => parse::run(&output, &session, &source)?,

        Commands::Build {
            source,
            out,
            branch,
            no_maps,
            spec_version,
        } => {
            let options = build::BuildOptions {
                out,
                branch,
                save_maps: !no_maps,
                spec_version,
            };
            build::run(&output, &session, &source, options)?
        }

        Commands::History { source } => history::run(&output, &session, &source)?,

        Commands::Tags => tags_cmd::run(&output, &session)?,
    }

    Ok(())
}
