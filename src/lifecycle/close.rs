//! `close`: merge a candidate into its release branch and stage it.
//!
//! Before the real merge, the patch is merged into a throwaway
//! `ho-validate/<id>` branch and the release is rebuilt there from the
//! schema dump: the staged patches, then this one, then the code generator.
//! If that leaves any committed file modified, applying the patch has a
//! side effect its files do not declare, and closing is refused. The
//! manifest only changes after the real merge succeeded, and a failure
//! before the staging commit resets the release branch to its pre-merge
//! head.

use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::PatchLifecycle;
use crate::cleanup::Cleanup;
use crate::defaults::VALIDATION_PREFIX;
use crate::error::{Error, Result};
use crate::manifest::ReleaseManifest;
use crate::patch_id::PatchId;
use crate::status::PatchStatus;
use crate::suggestions;
use crate::version::ReleaseVersion;

/// Outcome of `close`.
#[derive(Debug, Clone, Serialize)]
pub struct CloseReport {
    pub patch_id: PatchId,
    pub version: ReleaseVersion,
    pub manifest_path: PathBuf,
    pub merged_into: String,
    pub merge_commit: String,
    /// Other candidate branches that received the updated manifest.
    pub notified_branches: usize,
}

impl PatchLifecycle {
    /// Closes `id`, or the patch of the current `ho-patch/*` branch.
    pub fn close(&mut self, id: Option<&str>) -> Result<CloseReport> {
        let vcs = self.ctx.vcs().clone();
        let current = vcs.current_branch()?;
        let id = match id {
            Some(id) => PatchId::parse(id)?,
            None => PatchId::from_branch(&current)?,
        };
        let branch = id.branch_name();
        if current != branch {
            return Err(suggestions::not_on_patch_branch(&id, &current));
        }
        let manifest = self.find_candidate_manifest(&id)?;
        if !vcs.branch_exists(&branch)? {
            return Err(Error::not_found(&branch, "patch branch does not exist"));
        }
        self.ctx.ensure_clean()?;

        let version = *manifest.version();
        let release_branch = version.release_branch();
        self.validate_idempotence(&id, &version, &branch, &release_branch)?;

        vcs.checkout(&release_branch)?;
        let pre_merge = vcs.head_commit()?;
        let staged = vcs
            .merge(&branch, &format!("[HOP] Merge patch {}", id))
            .and_then(|commit| {
                debug!("Merged {} into {} as {}", branch, release_branch, commit);
                self.stage_merged(&id, &version, manifest.path(), &commit)
                    .map(|manifest| (commit, manifest))
            });
        let (merge_commit, manifest) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                self.rollback_close(&id, &branch, &pre_merge);
                return Err(e);
            }
        };
        self.status.update_status(
            &id,
            PatchStatus::Staged,
            Some(version),
            Some(merge_commit.clone()),
        )?;

        vcs.push_branch(&release_branch)
            .map_err(|e| suggestions::with_push_hint(e, self.ctx.remote(), &release_branch))?;
        let notified = self.sync_release(&version, &release_branch, manifest.path(), Some(&id))?;

        vcs.delete_branch(&branch)?;
        if let Err(e) = vcs.delete_remote_branch(&branch) {
            warn!("Could not delete the remote branch {}: {}", branch, e);
        }
        info!("Closed patch {} into {}", id, release_branch);

        Ok(CloseReport {
            patch_id: id,
            version,
            manifest_path: self.ctx.relative(manifest.path()),
            merged_into: release_branch,
            merge_commit,
            notified_branches: notified,
        })
    }

    /// Marks `id` staged in the manifest merged onto the release branch,
    /// moves its directory under `staged/` and commits both.
    fn stage_merged(
        &self,
        id: &PatchId,
        version: &ReleaseVersion,
        manifest_path: &Path,
        merge_commit: &str,
    ) -> Result<ReleaseManifest> {
        // The merge brought the patch branch's copy; stage on the merged file.
        let mut manifest = ReleaseManifest::load(manifest_path)?;
        manifest.move_to_staged(id, merge_commit)?;
        manifest.save()?;
        let from = self.status.directory_for(id, PatchStatus::Candidate);
        let to = self.status.directory_for(id, PatchStatus::Staged);
        self.relocate_directory(&from, &to)?;
        self.ctx.commit_file(
            manifest.path(),
            &format!("[HOP] Stage patch {} in release {}", id, version),
        )?;
        Ok(manifest)
    }

    /// Puts the release branch back where it was before the merge and
    /// returns to the patch branch. Failures are logged only.
    fn rollback_close(&mut self, id: &PatchId, branch: &str, pre_merge: &str) {
        warn!("Closing patch {} failed, rolling back", id);
        let vcs = self.ctx.vcs().clone();
        let mut cleanup = Cleanup::new(format!("rollback of close of {}", id));
        cleanup
            .step("discard uncommitted changes", || vcs.discard_changes())
            .step(&format!("reset the release branch to {}", pre_merge), || {
                vcs.reset_hard(pre_merge)
            })
            .step(&format!("check out {}", branch), || vcs.checkout(branch));
        cleanup.finish();
        self.status.invalidate();
    }

    /// Rebuilds the release with `id` merged on a throwaway branch and
    /// fails if that modified any committed file. Always returns to
    /// `branch` and deletes the throwaway branch.
    fn validate_idempotence(
        &mut self,
        id: &PatchId,
        version: &ReleaseVersion,
        branch: &str,
        release_branch: &str,
    ) -> Result<()> {
        let vcs = self.ctx.vcs().clone();
        let validation_branch = format!("{}{}", VALIDATION_PREFIX, id);
        if vcs.branch_exists(&validation_branch)? {
            debug!("Removing leftover {}", validation_branch);
            vcs.delete_branch(&validation_branch)?;
        }
        vcs.create_branch(&validation_branch, release_branch)?;
        vcs.checkout(&validation_branch)?;

        let outcome = vcs
            .merge(branch, &format!("[HOP] Validate patch {}", id))
            .and_then(|_| self.replay_staged_then(version, id))
            .and_then(|_| vcs.modified_files());

        let mut cleanup = Cleanup::new(format!("validation of {}", id));
        cleanup
            .step("discard validation changes", || vcs.discard_changes())
            .step(&format!("check out {}", branch), || vcs.checkout(branch))
            .step(&format!("delete {}", validation_branch), || {
                vcs.delete_branch(&validation_branch)
            });
        cleanup.finish();

        let modified = outcome?;
        if !modified.is_empty() {
            return Err(suggestions::idempotence_violation(id, modified));
        }
        debug!("Patch {} re-applies cleanly", id);
        Ok(())
    }
}
