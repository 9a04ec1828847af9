//! Default names and locations used across ho-dev.
//!
//! Branch and tag prefixes form the contract with the Git remote, so every
//! module builds ref names from the constants here rather than from string
//! literals.

use std::path::{Path, PathBuf};

/// Trunk branch.
pub const PROD_BRANCH: &str = "ho-prod";

/// Prefix of per-patch working branches and reservation tags.
pub const PATCH_PREFIX: &str = "ho-patch/";

/// Prefix of release integration branches.
pub const RELEASE_PREFIX: &str = "ho-release/";

/// Prefix of the ephemeral branches used by close-time validation.
pub const VALIDATION_PREFIX: &str = "ho-validate/";

/// Directory holding ho-dev metadata at the repository root.
pub const HOP_DIR: &str = ".hop";

/// Configuration file name inside [`HOP_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Default directory of patch directories.
pub const PATCHES_DIR: &str = "Patches";

/// Sub-directory of [`PATCHES_DIR`] for staged patches.
pub const STAGED_DIR: &str = "staged";

/// Sub-directory of [`PATCHES_DIR`] for orphaned patches.
pub const ORPHANED_DIR: &str = "orphaned";

/// Default directory of release manifests.
pub const RELEASES_DIR: &str = ".hop/releases";

/// Default canonical schema dump.
pub const SCHEMA_FILE: &str = "model/schema.sql";

/// Name of the documentation file every patch directory carries.
pub const README_FILE: &str = "README.md";

/// Default Git remote.
pub const REMOTE: &str = "origin";

/// Default interpreter for `.py` patch files.
pub const PYTHON: &str = "python3";

/// Environment variable that overrides repository discovery.
pub const REPO_ENV: &str = "HO_DEV_REPO";

/// Returns the configuration path for a repository root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(HOP_DIR).join(CONFIG_FILE)
}
