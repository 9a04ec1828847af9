//! # Error Handling
//!
//! This module defines the centralized error type for `ho-dev`. Every
//! failure inside the library is wrapped into the single [`Error`] enum so
//! that the command layer only has one thing to render.
//!
//! The variants follow the failure kinds the patch workflow distinguishes:
//!
//! - **Validation** failures (malformed patch id, wrong branch, dirty
//!   working tree, invalid version) are raised before anything is mutated.
//! - **Reservation conflicts** mean another developer already owns the patch
//!   number; they are never retried automatically.
//! - **Network** and **remote rejection** failures come from the Git remote.
//!   [`Error::is_network`] and [`Error::is_remote_rejection`] let the
//!   lifecycle protocols decide between rollback and "already succeeded, push
//!   again later".
//! - **Idempotence violations** and **merge conflicts** are fatal and need a
//!   human.
//!
//! Variants a user can act on carry an optional `hint`, usually the exact
//! command that fixes the situation (see [`crate::suggestions`]).

use thiserror::Error;

fn render_hint(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!("\n  hint: {}", h))
        .unwrap_or_default()
}

/// Main error type for ho-dev operations
#[derive(Error, Debug)]
pub enum Error {
    /// A precondition of an operation does not hold.
    #[error("Validation error: {message}{}", render_hint(hint))]
    Validation {
        message: String,
        hint: Option<String>,
    },

    /// A caller passed an argument outside of the accepted domain.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A string could not be parsed into the expected shape.
    #[error("Parsing error: {message}")]
    Parsing { message: String },

    /// A patch, release, branch or file does not exist.
    #[error("Not found: {resource} - {message}{}", render_hint(hint))]
    NotFound {
        resource: String,
        message: String,
        hint: Option<String>,
    },

    /// A patch is not in a status that allows the requested transition.
    #[error("Invalid patch state for {patch_id}: {message}")]
    InvalidState { patch_id: String, message: String },

    /// The patch number is already reserved by someone else.
    #[error("Patch number {number} is already reserved (tag {tag}){}", render_hint(hint))]
    ReservationConflict {
        number: u64,
        tag: String,
        hint: Option<String>,
    },

    /// The remote could not be reached.
    #[error("Network error during {operation}: {message}{}", render_hint(hint))]
    Network {
        operation: String,
        message: String,
        hint: Option<String>,
    },

    /// The remote refused a ref update.
    #[error("Remote rejected {reference}: {message}")]
    RemoteRejected { reference: String, message: String },

    /// A local git command failed.
    #[error("Git command failed: {command} - {stderr}")]
    GitCommand { command: String, stderr: String },

    /// A merge produced conflicts and was aborted.
    #[error("Merge conflict merging {source_branch} into {target_branch}: {message}{}", render_hint(hint))]
    MergeConflict {
        source_branch: String,
        target_branch: String,
        message: String,
        hint: Option<String>,
    },

    /// Re-applying the release context modified tracked files.
    #[error(
        "Applying patch {patch_id} is not idempotent, these files changed: {}{}",
        files.join(", "),
        render_hint(hint)
    )]
    IdempotenceViolation {
        patch_id: String,
        files: Vec<String>,
        hint: Option<String>,
    },

    /// The database rejected a statement or a restore step failed.
    #[error("Database error: {message}")]
    Database { message: String },

    /// A Python patch script exited with a failure.
    #[error("Script {script} failed: {message}")]
    Script { script: String, message: String },

    /// The external code generator failed.
    #[error("Code generation failed: {message}")]
    CodeGeneration { message: String },

    /// A release manifest is malformed or cannot be updated.
    #[error("Release manifest error in {path}: {message}")]
    Manifest { path: String, message: String },

    /// The repository configuration is missing or invalid.
    #[error("Configuration error: {message}{}", render_hint(hint))]
    Config {
        message: String,
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A TOML parsing error, wrapped from `toml::de::Error`.
    #[error("TOML parsing error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// A TOML serialization error, wrapped from `toml::ser::Error`.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A semantic versioning parsing error, wrapped from `semver::Error`.
    #[error("Semver parsing error: {0}")]
    Semver(#[from] semver::Error),
}

impl Error {
    /// Shorthand for a validation error without a hint.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for a validation error that suggests a fix.
    pub fn validation_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Shorthand for a not-found error without a hint.
    pub fn not_found(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Error::NotFound {
            resource: resource.into(),
            message: message.into(),
            hint: None,
        }
    }

    /// Whether the remote could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. })
    }

    /// Whether the remote was reached but refused the update.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(self, Error::RemoteRejected { .. })
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
