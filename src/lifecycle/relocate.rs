//! `attach` and `detach`: move a patch between a release and the orphanage.
//!
//! Both run on the release branch with a clean tree, keep the patch branch
//! and move the directory with `git mv` so its history follows. A staged
//! patch is already merged and can do neither. A failure before the commit
//! leaves the release branch as it was.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use super::PatchLifecycle;
use crate::cleanup::Cleanup;
use crate::error::{Error, Result};
use crate::patch_id::PatchId;
use crate::status::{PatchRecord, PatchStatus};
use crate::suggestions;
use crate::version::ReleaseVersion;

/// Outcome of `attach` or `detach`.
#[derive(Debug, Clone, Serialize)]
pub struct RelocationReport {
    pub patch_id: PatchId,
    pub version: ReleaseVersion,
    pub status: PatchStatus,
    pub directory: PathBuf,
    /// False when the patch had no directory to move.
    pub moved: bool,
    pub notified_branches: usize,
}

impl PatchLifecycle {
    /// Takes candidate `id` out of the release of the current branch.
    pub fn detach(&mut self, id: &str) -> Result<RelocationReport> {
        let id = PatchId::parse(id)?;
        let (release_branch, version) = self.current_release()?;
        self.ctx.ensure_clean()?;

        let record = self.require_record(&id)?;
        match record.status {
            PatchStatus::Candidate => {}
            PatchStatus::Staged => return Err(already_merged(&id)),
            PatchStatus::Orphaned => {
                return Err(Error::InvalidState {
                    patch_id: id.to_string(),
                    message: "patch is already orphaned".to_string(),
                })
            }
        }
        if let Some(owner) = record.version.filter(|owner| *owner != version) {
            return Err(Error::validation_with_hint(
                format!("patch {} belongs to release {}, not {}", id, owner, version),
                format!("git checkout {}", owner.release_branch()),
            ));
        }

        let base = self.ctx.vcs().head_commit()?;
        let to = self.status.directory_for(&id, PatchStatus::Orphaned);
        let (manifest_path, moved) = match self.record_detach(&id, &version) {
            Ok(done) => done,
            Err(e) => {
                self.rollback_relocation(&id, "detach", &base);
                return Err(e);
            }
        };
        self.status
            .update_status(&id, PatchStatus::Orphaned, None, None)?;

        let notified = self.sync_release(&version, &release_branch, &manifest_path, None)?;
        info!("Detached patch {} from release {}", id, version);
        Ok(RelocationReport {
            directory: self.ctx.relative(&to),
            patch_id: id,
            version,
            status: PatchStatus::Orphaned,
            moved,
            notified_branches: notified,
        })
    }

    /// Brings orphaned `id` back as a candidate of `version`.
    pub fn attach(&mut self, id: &str, version: &str) -> Result<RelocationReport> {
        let id = PatchId::parse(id)?;
        let version = ReleaseVersion::parse(version)?;
        let (release_branch, current) = self.current_release()?;
        if current != version {
            return Err(Error::validation_with_hint(
                format!(
                    "attaching to release {} requires its branch, current branch is {}",
                    version, release_branch
                ),
                format!("git checkout {}", version.release_branch()),
            ));
        }
        self.ctx.ensure_clean()?;

        let record = self.require_record(&id)?;
        match record.status {
            PatchStatus::Orphaned => {}
            PatchStatus::Staged => return Err(already_merged(&id)),
            PatchStatus::Candidate => {
                return Err(Error::InvalidState {
                    patch_id: id.to_string(),
                    message: match record.version {
                        Some(owner) => format!("patch is already a candidate of {}", owner),
                        None => "patch is already a candidate".to_string(),
                    },
                })
            }
        }

        let base = self.ctx.vcs().head_commit()?;
        let to = self.status.directory_for(&id, PatchStatus::Candidate);
        let (manifest_path, moved) = match self.record_attach(&id, &version) {
            Ok(done) => done,
            Err(e) => {
                self.rollback_relocation(&id, "attach", &base);
                return Err(e);
            }
        };
        self.status
            .update_status(&id, PatchStatus::Candidate, Some(version), None)?;

        let notified =
            self.sync_release(&version, &release_branch, &manifest_path, Some(&id))?;
        info!("Attached patch {} to release {}", id, version);
        Ok(RelocationReport {
            directory: self.ctx.relative(&to),
            patch_id: id,
            version,
            status: PatchStatus::Candidate,
            moved,
            notified_branches: notified,
        })
    }

    /// Removes `id` from the stage manifest, moves its directory under
    /// `orphaned/` and commits both. Returns the manifest path and whether
    /// a directory moved.
    fn record_detach(&self, id: &PatchId, version: &ReleaseVersion) -> Result<(PathBuf, bool)> {
        let mut manifest = self.stage_manifest(version)?;
        // Patches found only on disk have no manifest entry to remove.
        if manifest.contains(id) {
            manifest.remove_patch(id)?;
            manifest.save()?;
        }
        let from = self.status.directory_for(id, PatchStatus::Candidate);
        let to = self.status.directory_for(id, PatchStatus::Orphaned);
        if !from.is_dir() {
            self.fetch_from_patch_branch(id, &from);
        }
        let moved = self.relocate_directory(&from, &to)?;
        self.ctx.commit_file(
            manifest.path(),
            &format!("[HOP] Detach patch {} from release {}", id, version),
        )?;
        Ok((manifest.path().to_path_buf(), moved))
    }

    /// Adds `id` to the stage manifest as a candidate, moves its directory
    /// out of `orphaned/` and commits both.
    fn record_attach(&self, id: &PatchId, version: &ReleaseVersion) -> Result<(PathBuf, bool)> {
        let mut manifest = self.stage_manifest(version)?;
        manifest.add_patch(id)?;
        manifest.save()?;
        let from = self.status.directory_for(id, PatchStatus::Orphaned);
        let to = self.status.directory_for(id, PatchStatus::Candidate);
        let moved = self.relocate_directory(&from, &to)?;
        self.ctx.commit_file(
            manifest.path(),
            &format!("[HOP] Attach patch {} to release {}", id, version),
        )?;
        Ok((manifest.path().to_path_buf(), moved))
    }

    /// Drops every change a failed `attach` or `detach` made to the release
    /// branch. Failures are logged only.
    fn rollback_relocation(&mut self, id: &PatchId, operation: &str, base: &str) {
        warn!("Could not {} patch {}, rolling back", operation, id);
        let vcs = self.ctx.vcs().clone();
        let mut cleanup = Cleanup::new(format!("rollback of {} of {}", operation, id));
        cleanup
            .step("discard uncommitted changes", || vcs.discard_changes())
            .step(&format!("reset the release branch to {}", base), || {
                vcs.reset_hard(base)
            });
        cleanup.finish();
        self.status.invalidate();
    }

    /// A candidate directory is usually committed on its patch branch
    /// only. Brings it into the working tree so that detaching records it
    /// under `orphaned/`; without the branch the move is skipped.
    fn fetch_from_patch_branch(&self, id: &PatchId, dir: &Path) {
        let vcs = self.ctx.vcs();
        let branch = id.branch_name();
        let fetched = vcs
            .branch_exists(&branch)
            .and_then(|exists| {
                if !exists {
                    return Ok(false);
                }
                vcs.checkout_file_from(&branch, &self.ctx.relative(dir))?;
                Ok(true)
            });
        match fetched {
            Ok(true) => debug!("Took {} from {}", self.ctx.relative(dir).display(), branch),
            Ok(false) => debug!("No branch {}, nothing to relocate", branch),
            Err(e) => warn!("Could not take the directory of {} from {}: {}", id, branch, e),
        }
    }

    fn require_record(&mut self, id: &PatchId) -> Result<PatchRecord> {
        match self.status.get(id)? {
            Some(record) => Ok(record),
            None => {
                let known = self.known_ids()?;
                Err(suggestions::unknown_patch(id, &known))
            }
        }
    }
}

fn already_merged(id: &PatchId) -> Error {
    Error::InvalidState {
        patch_id: id.to_string(),
        message: "patch is staged (already merged) and cannot be attached or detached".to_string(),
    }
}
