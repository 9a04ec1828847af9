//! The ORM code generator collaborator.
//!
//! After every schema change the generated source must be brought back in
//! line with the live database. The generator itself is an external program;
//! ho-dev only invokes it and reports which files it wrote.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::error::{Error, Result};

/// Regenerates ORM source from the live schema - allows mocking in tests
pub trait CodeGenerator: Send + Sync {
    /// Rewrites generated files under `root` and returns them relative to
    /// `root`. An error aborts the calling workflow.
    fn generate(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// Runs a configured command. Each line the command prints that names an
/// existing file is reported as generated.
pub struct CommandGenerator {
    command: Vec<String>,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl CodeGenerator for CommandGenerator {
    fn generate(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let (program, args) = self.command.split_first().ok_or_else(|| Error::Config {
            message: "codegen.command is empty".to_string(),
            hint: Some("set [codegen] command = [\"half_orm\", \"sync-package\"]".to_string()),
        })?;
        debug!("Running code generator: {}", self.command.join(" "));

        let output = Command::new(program)
            .args(args)
            .current_dir(root)
            .output()
            .map_err(|e| Error::CodeGeneration {
                message: format!("could not start {}: {}", program, e),
            })?;
        if !output.status.success() {
            return Err(Error::CodeGeneration {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(generated_paths(root, &String::from_utf8_lossy(&output.stdout)))
    }
}

fn generated_paths(root: &Path, stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .filter(|path| root.join(path).is_file())
        .collect()
}
