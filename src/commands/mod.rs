//! # CLI Command Implementations
//!
//! Each subcommand of `ho-dev` lives in its own file with:
//! - an `Args` struct (or a subcommand enum) derived with `clap`,
//! - an `execute` function that calls into the `ho_dev` library and renders
//!   the returned report.

pub mod completions;
pub mod patch;
pub mod release;
pub mod status;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ho_dev::repo::Repo;

/// Where the repository is: the `--repo` flag, or discovery from the
/// working directory.
#[derive(Debug, Clone)]
pub struct RepoLocation {
    root: Option<PathBuf>,
}

impl RepoLocation {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn open(&self) -> Result<Repo> {
        let repo = match &self.root {
            Some(root) => Repo::open(root)?,
            None => {
                let cwd = env::current_dir().context("cannot read the working directory")?;
                Repo::discover(&cwd)?
            }
        };
        Ok(repo)
    }
}
