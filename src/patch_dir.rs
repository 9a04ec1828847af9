//! Patch directories and the files they apply.
//!
//! A patch directory holds a `README.md` plus `NN_description.sql` and
//! `NN_description.py` files. Only `.sql` and `.py` files are executed;
//! anything else is ignored. Files run in case-insensitive lexicographic
//! order of their names, comparing Unicode codepoints of the lowercased
//! name so the order is the same on every machine regardless of locale.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use walkdir::WalkDir;

use crate::defaults::README_FILE;
use crate::error::{Error, Result};
use crate::patch_id::PatchId;

/// Kind of executable patch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFileKind {
    Sql,
    Python,
}

/// One executable file of a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFile {
    pub path: PathBuf,
    pub name: String,
    pub kind: PatchFileKind,
}

impl PatchFile {
    fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        let ext = path.extension()?.to_string_lossy();
        let kind = if ext.eq_ignore_ascii_case("sql") {
            PatchFileKind::Sql
        } else if ext.eq_ignore_ascii_case("py") {
            PatchFileKind::Python
        } else {
            return None;
        };
        Some(Self {
            path: path.to_path_buf(),
            name,
            kind,
        })
    }
}

/// Application order of two file names.
pub fn compare_file_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Checks that `dir` is an existing directory.
pub fn ensure_patch_directory(id: &PatchId, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(Error::NotFound {
            resource: dir.display().to_string(),
            message: format!("patch directory of {} does not exist", id),
            hint: Some(format!("ho-dev patch create {}", id)),
        });
    }
    if !dir.is_dir() {
        return Err(Error::validation(format!(
            "{} is a file, a patch must be a directory",
            dir.display()
        )));
    }
    Ok(())
}

/// Executable files directly inside `dir`, in application order.
pub fn patch_files(dir: &Path) -> Result<Vec<PatchFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        match PatchFile::from_path(entry.path()) {
            Some(file) => files.push(file),
            None => debug!("Ignoring {}", entry.path().display()),
        }
    }
    files.sort_by(|a, b| compare_file_names(&a.name, &b.name));
    Ok(files)
}

/// README written into a freshly created patch directory.
pub fn readme_template(id: &PatchId, description: Option<&str>) -> String {
    let mut readme = format!("# Patch {}\n\n", id);
    match description {
        Some(description) if !description.trim().is_empty() => {
            readme.push_str(description.trim());
            readme.push_str("\n\n");
        }
        _ => readme.push_str("Describe the purpose of this patch.\n\n"),
    }
    readme.push_str(
        "## Files\n\n\
         Add `NN_description.sql` and `NN_description.py` files to this directory.\n\
         They are applied in lexicographic order of their names; other files are ignored.\n",
    );
    readme
}

/// Creates the patch directory with its README and returns the README path.
pub fn create_patch_directory(dir: &Path, id: &PatchId, description: Option<&str>) -> Result<PathBuf> {
    if dir.exists() {
        return Err(Error::validation(format!(
            "patch directory {} already exists",
            dir.display()
        )));
    }
    fs::create_dir_all(dir)?;
    let readme = dir.join(README_FILE);
    fs::write(&readme, readme_template(id, description))?;
    Ok(readme)
}

/// Runs `.py` patch files - allows mocking in tests
pub trait ScriptRunner: Send + Sync {
    /// Runs `script` with `working_dir` as current directory and fails if
    /// the script exits unsuccessfully.
    fn run_script(&self, script: &Path, working_dir: &Path) -> Result<()>;
}

/// Runs scripts in a separate interpreter process.
pub struct PythonRunner {
    interpreter: String,
}

impl PythonRunner {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl ScriptRunner for PythonRunner {
    fn run_script(&self, script: &Path, working_dir: &Path) -> Result<()> {
        debug!("{} {}", self.interpreter, script.display());
        let output = Command::new(&self.interpreter)
            .arg(script)
            .current_dir(working_dir)
            .output()
            .map_err(|e| Error::Script {
                script: script.display().to_string(),
                message: format!("could not start {}: {}", self.interpreter, e),
            })?;
        if !output.status.success() {
            return Err(Error::Script {
                script: script.display().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
