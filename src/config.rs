//! # Repository Configuration
//!
//! Every ho-dev repository carries `.hop/config.toml` at its root. Only
//! `package_name` is required; everything else falls back to the defaults
//! in [`crate::defaults`].
//!
//! ```toml
//! package_name = "blog"
//! remote = "origin"
//! python = "python3"
//!
//! [database]
//! name = "blog"
//! host = "localhost"
//! port = 5432
//! user = "postgres"
//!
//! [codegen]
//! command = ["half_orm", "sync-package"]
//!
//! [layout]
//! patches_dir = "Patches"
//! releases_dir = ".hop/releases"
//! schema_file = "model/schema.sql"
//! ```
//!
//! [`parse`] turns a string into a [`RepoConfig`], [`from_file`] reads it
//! from disk, and [`find_root`] locates the repository from any directory
//! inside it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Connection settings passed to the PostgreSQL client tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name. Defaults to the package name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
}

/// External ORM generator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenConfig {
    #[serde(default = "default_codegen_command")]
    pub command: Vec<String>,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            command: default_codegen_command(),
        }
    }
}

fn default_codegen_command() -> Vec<String> {
    vec!["half_orm".to_string(), "sync-package".to_string()]
}

/// Repository-relative locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_patches_dir")]
    pub patches_dir: PathBuf,
    #[serde(default = "default_releases_dir")]
    pub releases_dir: PathBuf,
    #[serde(default = "default_schema_file")]
    pub schema_file: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            patches_dir: default_patches_dir(),
            releases_dir: default_releases_dir(),
            schema_file: default_schema_file(),
        }
    }
}

fn default_patches_dir() -> PathBuf {
    PathBuf::from(defaults::PATCHES_DIR)
}

fn default_releases_dir() -> PathBuf {
    PathBuf::from(defaults::RELEASES_DIR)
}

fn default_schema_file() -> PathBuf {
    PathBuf::from(defaults::SCHEMA_FILE)
}

fn default_remote() -> String {
    defaults::REMOTE.to_string()
}

fn default_python() -> String {
    defaults::PYTHON.to_string()
}

/// Parsed `.hop/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub package_name: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub codegen: CodegenConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl RepoConfig {
    /// Minimal configuration for `package_name`.
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            remote: default_remote(),
            python: default_python(),
            database: None,
            codegen: CodegenConfig::default(),
            layout: LayoutConfig::default(),
        }
    }

    /// Database settings with the name defaulted to the package name.
    pub fn database(&self) -> DatabaseConfig {
        let mut database = self.database.clone().unwrap_or(DatabaseConfig {
            name: String::new(),
            host: None,
            port: None,
            user: None,
        });
        if database.name.is_empty() {
            database.name = self.package_name.clone();
        }
        database
    }
}

/// Parses configuration text.
pub fn parse(content: &str) -> Result<RepoConfig> {
    let config: RepoConfig = toml::from_str(content).map_err(|e| Error::Config {
        message: e.to_string(),
        hint: Some("package_name is the only required key".to_string()),
    })?;
    if config.package_name.trim().is_empty() {
        return Err(Error::Config {
            message: "package_name must not be empty".to_string(),
            hint: None,
        });
    }
    for (key, path) in [
        ("layout.patches_dir", &config.layout.patches_dir),
        ("layout.releases_dir", &config.layout.releases_dir),
        ("layout.schema_file", &config.layout.schema_file),
    ] {
        if path.is_absolute() {
            return Err(Error::Config {
                message: format!("{} must be relative to the repository root", key),
                hint: None,
            });
        }
    }
    Ok(config)
}

/// Reads and parses a configuration file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RepoConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("cannot read {}: {}", path.display(), e),
        hint: None,
    })?;
    parse(&content)
}

/// Walks up from `start` to the first directory holding `.hop/config.toml`.
pub fn find_root(start: &Path) -> Result<PathBuf> {
    start
        .ancestors()
        .find(|dir| defaults::config_path(dir).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::Config {
            message: format!("no .hop/config.toml found in {} or its parents", start.display()),
            hint: Some(format!(
                "run ho-dev inside a ho-dev repository or set {}",
                defaults::REPO_ENV
            )),
        })
}
