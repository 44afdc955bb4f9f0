//! # Storage Layer
//!
//! Everything vdf reads from or writes to disk outside of the sources
//! themselves.
//!
//! ## Files
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Project config | TOML | `vdf.toml` at the project root |
//! | Global config | TOML | platform config dir, `config.toml` |
//! | Tables | YAML with `_fallback_` | embedded, overridable from `[tables]` |
//! | Output files | rendered text | `{output.dir}/{name}{ext}` |
//! | Provenance maps | one JSON record per line | `{output.dir}/{name}{ext}.map` |
//! | Build manifest | JSON | `{output.dir}/build.json` |
//!
//! All writes are atomic (temp file + rename).
//!
//! ## Key Types
//!
//! - [`Config`] - Project and global configuration
//! - [`Catalog`] - Source formats, file kinds, runners and tags
//! - [`ArtifactWriter`] - Saves output files, maps and the manifest

mod config;
mod output;
mod tables;

pub use config::{
    Config, ConfigError, DocumentConfig, GlobalConfig, OutputConfig, OutputFormat, ProjectConfig,
    TablesConfig, PROJECT_CONFIG_FILE,
};
pub use output::{ArtifactWriter, BuildManifest, ManifestEntry, MANIFEST_FILE, MAP_SUFFIX};
pub use tables::{
    parse_file_table, parse_format_table, parse_tag_table, tag_defs_from_value, Catalog,
    FALLBACK_KEY,
};
