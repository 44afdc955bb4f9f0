//! Configuration handling for vdf
//!
//! | File          | Location                                   | Holds                          |
//! |---------------|--------------------------------------------|--------------------------------|
//! | `vdf.toml`    | nearest ancestor of the working directory  | `[output]`, `[tables]`, `[document]` |
//! | `config.toml` | platform config dir (`directories`)        | `default_format`               |
//!
//! Both files are optional; missing keys take their defaults. Relative
//! paths in `vdf.toml` resolve against the directory holding it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DEFAULT_BRANCH;

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "vdf.toml";

const GLOBAL_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("Malformed {table} table: {reason}")]
    Table { table: String, reason: String },

    #[error("Tag '{tag}' uses unknown runner '{runner}'")]
    UnknownRunner { tag: String, runner: String },

    #[error("Tag '{tag}' has an invalid argument format '{pattern}': {reason}")]
    InvalidPattern {
        tag: String,
        pattern: String,
        reason: String,
    },

    #[error("Name '{0}' is reserved (names must not start with '_')")]
    ReservedName(String),
}

/// `[output]`: where and how generated files are saved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Line ending of saved files
    pub eol: String,
    /// Library name handed to the build step
    pub library: String,
    /// Write `<file>.map` provenance sidecars
    pub save_maps: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("build"),
            eol: "\n".to_string(),
            library: "work".to_string(),
            save_maps: true,
        }
    }
}

/// `[tables]`: replacements for the built-in tables
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TablesConfig {
    pub tags: Option<PathBuf>,
    pub files: Option<PathBuf>,
    pub formats: Option<PathBuf>,
}

/// `[document]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub default_branch: String,
    /// Wins over the frontmatter's version
    pub spec_version: Option<String>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            default_branch: DEFAULT_BRANCH.to_string(),
            spec_version: None,
        }
    }
}

/// Contents of `vdf.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectConfig {
    pub output: OutputConfig,
    pub tables: TablesConfig,
    pub document: DocumentConfig,
}

impl ProjectConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.document.default_branch.is_empty() {
            return Err(ConfigError::Invalid("document.default_branch is empty".into()));
        }
        if self.output.eol.is_empty() {
            return Err(ConfigError::Invalid("output.eol is empty".into()));
        }
        Ok(())
    }
}

/// Contents of the global `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    pub default_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Effective configuration of one invocation
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    /// Directory holding `vdf.toml`, if one was found
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Configuration seen from the working directory
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("Cannot determine the working directory")?;
        let global = match ProjectDirs::from("dev", "vdf", "vdf") {
            Some(dirs) => read_toml(&dirs.config_dir().join(GLOBAL_CONFIG_FILE))?,
            None => GlobalConfig::default(),
        };
        Ok(Self {
            global,
            ..Self::discover(&cwd)?
        })
    }

    /// Project configuration from the nearest `vdf.toml` at or above `start`
    pub fn discover(start: &Path) -> Result<Self> {
        let Some(root) = start
            .ancestors()
            .find(|dir| dir.join(PROJECT_CONFIG_FILE).is_file())
        else {
            return Ok(Self::default());
        };

        let project: ProjectConfig = read_toml(&root.join(PROJECT_CONFIG_FILE))?;
        project.validate()?;
        Ok(Self {
            project,
            global: GlobalConfig::default(),
            project_root: Some(root.to_path_buf()),
        })
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.project.output.dir)
    }

    /// `path` against the project root; the working directory without one
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Parses a TOML file; a missing file yields the defaults
fn read_toml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.is_file() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_project_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::discover(dir.path()).unwrap();

        assert_eq!(config.project_root, None);
        assert_eq!(config.project.output.dir, PathBuf::from("build"));
        assert_eq!(config.project.output.library, "work");
        assert!(config.project.output.save_maps);
        assert_eq!(config.project.document.default_branch, "main");
        assert_eq!(config.output_dir(), PathBuf::from("build"));
    }

    #[test]
    fn nearest_ancestor_is_the_root() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[output]\ndir = \"gen\"\nsave_maps = false\n\n[tables]\ntags = \"tables/tags.yaml\"\n\n[document]\nspec_version = \"0.2\"\n",
        )
        .unwrap();
        let nested = dir.path().join("rtl").join("fifo");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover(&nested).unwrap();
        assert_eq!(config.project_root.as_deref(), Some(dir.path()));
        assert_eq!(config.output_dir(), dir.path().join("gen"));
        assert!(!config.project.output.save_maps);
        assert_eq!(config.project.output.eol, "\n");
        assert_eq!(
            config.resolve(config.project.tables.tags.as_deref().unwrap()),
            dir.path().join("tables/tags.yaml")
        );
        assert_eq!(config.project.tables.files, None);
        assert_eq!(config.project.document.spec_version.as_deref(), Some("0.2"));
    }

    #[test]
    fn absolute_paths_stay_put() {
        let config = Config {
            project_root: Some(PathBuf::from("/work/proj")),
            ..Config::default()
        };
        assert_eq!(
            config.resolve(Path::new("/abs/tags.yaml")),
            PathBuf::from("/abs/tags.yaml")
        );
    }

    #[test]
    fn empty_default_branch_is_invalid() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[document]\ndefault_branch = \"\"\n",
        )
        .unwrap();

        let err = Config::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("default_branch"));
    }

    #[test]
    fn malformed_toml_names_the_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PROJECT_CONFIG_FILE), "[output\n").unwrap();

        let err = Config::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains(PROJECT_CONFIG_FILE));
    }

    #[test]
    fn global_format_parses() {
        let config: GlobalConfig = toml::from_str("default_format = \"json\"\n").unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
    }
}
