//! # ho-dev
//!
//! Git-centric management of database schema patches and the releases that
//! ship them. A patch is a directory of SQL and Python files developed on
//! its own `ho-patch/<id>` branch; a release is an ordered list of patches
//! recorded in manifest files under `.hop/releases/` and integrated on a
//! `ho-release/X.Y.Z` branch before it reaches `ho-prod`.
//!
//! The Git remote is the only shared state between developers. Patch
//! numbers are reserved by pushing a `ho-patch/<id>` tag, so two people can
//! never claim the same number.
//!
//! ## Quick Example
//!
//! ```
//! use ho_dev::patch_id::PatchId;
//! use ho_dev::version::ReleaseVersion;
//!
//! let id = PatchId::parse("42-add-users").unwrap();
//! assert_eq!(id.number(), 42);
//! assert_eq!(id.branch_name(), "ho-patch/42-add-users");
//!
//! let version = ReleaseVersion::parse("v1.3.0").unwrap();
//! assert_eq!(version.release_branch(), "ho-release/1.3.0");
//! ```
//!
//! ## Core Concepts
//!
//! - **Patch lifecycle (`lifecycle`)**: `create`, `apply`, `close`,
//!   `attach` and `detach`. When a step fails before the final commit,
//!   `create`, `close`, `attach` and `detach` put the branches back where
//!   they were and `apply` restores the database from the schema dump.
//! - **Release manifests (`manifest`)**: `X.Y.Z-stage.toml`,
//!   `X.Y.Z-rcN.toml` and `X.Y.Z.toml`, each listing patches in application
//!   order with their `candidate` or `staged` status.
//! - **Status index (`status`)**: where every patch stands, derived from the
//!   manifests and the patch directories and cached until invalidated.
//! - **Version tags (`version`)**: gap-filling release numbering from the
//!   existing `vX.Y.Z` tags.
//! - **Promotion (`promotion`)**: `stage -> rcN -> production`, each step a
//!   history-preserving rename of the manifest.
//! - **Collaborators (`git`, `database`, `patch_dir`, `codegen`)**: narrow
//!   traits over the system `git`, `psql`, the Python interpreter and the
//!   ORM code generator, injected through [`repo::RepoContext`].

pub mod cleanup;
pub mod codegen;
pub mod config;
pub mod database;
pub mod defaults;
pub mod error;
pub mod git;
pub mod lifecycle;
pub mod manifest;
pub mod output;
pub mod patch_dir;
pub mod patch_id;
pub mod promotion;
pub mod repo;
pub mod status;
pub mod suggestions;
pub mod version;
