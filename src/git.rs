//! # Git Plumbing
//!
//! The lifecycle protocols talk to Git through the narrow
//! [`VersionControl`] capability. [`SystemGit`] implements it by shelling out
//! to the system `git` binary, which picks up SSH keys, credential helpers
//! and whatever else the user configured in `~/.gitconfig`.
//!
//! Remote failures are classified so that callers can tell a remote that
//! could not be reached ([`Error::Network`]) from a remote that refused a ref
//! update ([`Error::RemoteRejected`]); everything else is a local
//! [`Error::GitCommand`].
//!
//! All paths passed to the trait are relative to the repository root.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log::{debug, warn};

use crate::error::{Error, Result};

/// Git operations used by the patch and release workflows - allows mocking in tests
pub trait VersionControl: Send + Sync {
    fn current_branch(&self) -> Result<String>;

    /// Commit hash of `HEAD`.
    fn head_commit(&self) -> Result<String>;

    /// Paths that differ from `HEAD`, including untracked files.
    fn modified_files(&self) -> Result<Vec<String>>;

    /// Whether the configured remote exists.
    fn has_remote(&self) -> Result<bool>;

    fn fetch_tags(&self) -> Result<()>;

    /// Local tag names, without the `refs/tags/` prefix.
    fn list_tags(&self) -> Result<Vec<String>>;
    fn tag_exists(&self, tag: &str) -> Result<bool>;
    fn create_tag(&self, tag: &str, message: Option<&str>) -> Result<()>;
    fn delete_tag(&self, tag: &str) -> Result<()>;
    fn push_tag(&self, tag: &str) -> Result<()>;
    fn delete_remote_tag(&self, tag: &str) -> Result<()>;

    /// Local branches whose name starts with `prefix`.
    fn list_branches(&self, prefix: &str) -> Result<Vec<String>>;
    fn branch_exists(&self, branch: &str) -> Result<bool>;
    fn create_branch(&self, branch: &str, start_point: &str) -> Result<()>;
    fn checkout(&self, branch: &str) -> Result<()>;

    /// Deletes a local branch even if it is not merged.
    fn delete_branch(&self, branch: &str) -> Result<()>;

    /// Pushes a branch and sets its upstream.
    fn push_branch(&self, branch: &str) -> Result<()>;
    fn delete_remote_branch(&self, branch: &str) -> Result<()>;

    /// Merges `branch` into the current branch with a merge commit and
    /// returns the resulting commit hash. A conflicting merge is aborted and
    /// reported as [`Error::MergeConflict`].
    fn merge(&self, branch: &str, message: &str) -> Result<String>;

    fn add(&self, paths: &[&Path]) -> Result<()>;

    /// History-preserving move.
    fn mv(&self, from: &Path, to: &Path) -> Result<()>;

    /// Commits the index and returns the new commit hash.
    fn commit(&self, message: &str) -> Result<String>;

    fn reset_hard(&self, commit: &str) -> Result<()>;

    /// Throws away every uncommitted change, untracked files included.
    fn discard_changes(&self) -> Result<()>;

    /// Replaces `path` in the working tree and index with its version on
    /// `branch`.
    fn checkout_file_from(&self, branch: &str, path: &Path) -> Result<()>;
}

/// The default implementation of `VersionControl`, which uses the system's
/// `git` command.
pub struct SystemGit {
    root: PathBuf,
    remote: String,
}

impl SystemGit {
    pub fn new(root: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            remote: remote.into(),
        }
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::GitCommand {
                command: args.join(" "),
                stderr: e.to_string(),
            })
    }

    /// Runs a local git command and returns its trimmed stdout.
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(Error::GitCommand {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs a git command that talks to the remote.
    fn run_remote(&self, args: &[&str], reference: &str) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_remote_failure(&args.join(" "), reference, &stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn path_arg(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// `refs/heads/<name>` when `name` is a local branch, else `name`
    /// unchanged. Git resolves an ambiguous short name to the tag first.
    fn branch_or_rev(&self, name: &str) -> Result<String> {
        if self.branch_exists(name)? {
            Ok(head_ref(name))
        } else {
            Ok(name.to_string())
        }
    }
}

const HEADS: &str = "refs/heads/";

fn head_ref(branch: &str) -> String {
    format!("{}{}", HEADS, branch)
}

/// Sorts a failed remote command into network, rejection or local failure.
pub fn classify_remote_failure(command: &str, reference: &str, stderr: &str) -> Error {
    let lower = stderr.to_lowercase();
    let network_markers = [
        "could not resolve host",
        "could not read from remote repository",
        "unable to access",
        "connection refused",
        "connection timed out",
        "network is unreachable",
        "authentication failed",
        "permission denied",
    ];
    let rejection_markers = [
        "[rejected]",
        "already exists",
        "non-fast-forward",
        "remote rejected",
        "failed to push some refs",
    ];

    if rejection_markers.iter().any(|m| lower.contains(m)) {
        Error::RemoteRejected {
            reference: reference.to_string(),
            message: stderr.trim().to_string(),
        }
    } else if network_markers.iter().any(|m| lower.contains(m)) {
        Error::Network {
            operation: command.to_string(),
            message: stderr.trim().to_string(),
            hint: Some("check your connection and credentials, then retry".to_string()),
        }
    } else {
        Error::GitCommand {
            command: command.to_string(),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Parses `git status --porcelain` output into paths.
pub fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            // Renames are reported as "old -> new".
            match path.split_once(" -> ") {
                Some((_, new)) => new.to_string(),
                None => path.to_string(),
            }
        })
        .collect()
}

impl VersionControl for SystemGit {
    fn current_branch(&self) -> Result<String> {
        // `rev-parse --abbrev-ref` answers `heads/<b>` when a tag shares the
        // branch name, as `ho-patch/<n>` does for a bare patch id.
        let output = self.output(&["symbolic-ref", "--quiet", "HEAD"])?;
        if !output.status.success() {
            return Ok("HEAD".to_string());
        }
        let refname = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(refname
            .strip_prefix(HEADS)
            .map(str::to_string)
            .unwrap_or(refname))
    }

    fn head_commit(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"])
    }

    fn modified_files(&self) -> Result<Vec<String>> {
        let output = self.output(&["status", "--porcelain", "--untracked-files=all"])?;
        if !output.status.success() {
            return Err(Error::GitCommand {
                command: "status --porcelain".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // Not trimmed: the first status column may be a space.
        Ok(parse_porcelain(&String::from_utf8_lossy(&output.stdout)))
    }

    fn has_remote(&self) -> Result<bool> {
        let remotes = self.run(&["remote"])?;
        Ok(remotes.lines().any(|r| r.trim() == self.remote))
    }

    fn fetch_tags(&self) -> Result<()> {
        self.run_remote(&["fetch", &self.remote, "--tags", "--prune-tags"], "tags")?;
        Ok(())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let stdout = self.run(&["tag", "--list"])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn tag_exists(&self, tag: &str) -> Result<bool> {
        let refname = format!("refs/tags/{}", tag);
        let output = self.output(&["rev-parse", "--verify", "--quiet", &refname])?;
        Ok(output.status.success())
    }

    fn create_tag(&self, tag: &str, message: Option<&str>) -> Result<()> {
        match message {
            Some(message) => self.run(&["tag", "-a", tag, "-m", message])?,
            None => self.run(&["tag", tag])?,
        };
        Ok(())
    }

    fn delete_tag(&self, tag: &str) -> Result<()> {
        self.run(&["tag", "-d", tag])?;
        Ok(())
    }

    fn push_tag(&self, tag: &str) -> Result<()> {
        let refspec = format!("refs/tags/{}", tag);
        self.run_remote(&["push", &self.remote, &refspec], &refspec)?;
        Ok(())
    }

    fn delete_remote_tag(&self, tag: &str) -> Result<()> {
        let refspec = format!(":refs/tags/{}", tag);
        self.run_remote(&["push", &self.remote, &refspec], tag)?;
        Ok(())
    }

    fn list_branches(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}{}*", HEADS, prefix);
        let stdout = self.run(&["for-each-ref", "--format=%(refname)", &pattern])?;
        Ok(stdout
            .lines()
            .filter_map(|r| r.trim().strip_prefix(HEADS))
            .map(str::to_string)
            .collect())
    }

    fn branch_exists(&self, branch: &str) -> Result<bool> {
        let output = self.output(&["rev-parse", "--verify", "--quiet", &head_ref(branch)])?;
        Ok(output.status.success())
    }

    fn create_branch(&self, branch: &str, start_point: &str) -> Result<()> {
        let start_point = self.branch_or_rev(start_point)?;
        self.run(&["branch", branch, &start_point])?;
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.run(&["switch", "--quiet", branch])?;
        Ok(())
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run(&["branch", "-D", branch])?;
        Ok(())
    }

    fn push_branch(&self, branch: &str) -> Result<()> {
        let refspec = format!("{0}:{0}", head_ref(branch));
        self.run_remote(&["push", "--set-upstream", &self.remote, &refspec], branch)?;
        Ok(())
    }

    fn delete_remote_branch(&self, branch: &str) -> Result<()> {
        let refspec = format!(":{}", head_ref(branch));
        self.run_remote(&["push", &self.remote, &refspec], branch)?;
        Ok(())
    }

    fn merge(&self, branch: &str, message: &str) -> Result<String> {
        let source = self.branch_or_rev(branch)?;
        let output = self.output(&["merge", "--no-ff", "-m", message, &source])?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let target = self.current_branch().unwrap_or_default();
            if stdout.contains("CONFLICT") || stderr.contains("CONFLICT") {
                // Leave the working tree as it was before the merge.
                if let Err(e) = self.run(&["merge", "--abort"]) {
                    warn!("Could not abort the merge of {}: {}", branch, e);
                }
                return Err(Error::MergeConflict {
                    source_branch: branch.to_string(),
                    target_branch: target,
                    message: stdout.trim().to_string(),
                    hint: Some(format!(
                        "resolve the conflicts on {} manually, then close again",
                        branch
                    )),
                });
            }
            return Err(Error::GitCommand {
                command: format!("merge --no-ff {}", branch),
                stderr: stderr.trim().to_string(),
            });
        }
        self.head_commit()
    }

    fn add(&self, paths: &[&Path]) -> Result<()> {
        let mut args = vec!["add".to_string(), "--".to_string()];
        args.extend(paths.iter().map(|p| Self::path_arg(p)));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)?;
        Ok(())
    }

    fn mv(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(self.root.join(parent))?;
        }
        self.run(&["mv", &Self::path_arg(from), &Self::path_arg(to)])?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.run(&["commit", "-m", message])?;
        self.head_commit()
    }

    fn reset_hard(&self, commit: &str) -> Result<()> {
        self.run(&["reset", "--hard", commit])?;
        Ok(())
    }

    fn discard_changes(&self) -> Result<()> {
        self.run(&["reset", "--hard", "HEAD"])?;
        self.run(&["clean", "-fd"])?;
        Ok(())
    }

    fn checkout_file_from(&self, branch: &str, path: &Path) -> Result<()> {
        let source = self.branch_or_rev(branch)?;
        self.run(&["checkout", &source, "--", &Self::path_arg(path)])?;
        Ok(())
    }
}
