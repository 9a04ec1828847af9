//! # Patch Lifecycle
//!
//! [`PatchLifecycle`] is the facade over the patch state machine:
//!
//! ```text
//!            create                close
//!   (none) ---------> candidate ---------> staged
//!                      |    ^
//!               detach |    | attach
//!                      v    |
//!                     orphaned
//! ```
//!
//! Every transition is a multi-step protocol across Git, the patch
//! directories and the release manifests. Each operation lives in its own
//! submodule; this module holds the state shared between them (the two
//! indexes) and the helpers they have in common.

mod apply;
mod close;
mod create;
mod relocate;
mod report;

pub use apply::{ApplyReport, ApplyStatus};
pub use close::CloseReport;
pub use create::CreateReport;
pub use relocate::RelocationReport;
pub use report::{PatchSummary, ReleaseSummary, StatusReport};

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::manifest::{self, ReleaseManifest};
use crate::patch_id::PatchId;
use crate::repo::RepoContext;
use crate::status::{PatchStatus, PatchStatusIndex};
use crate::suggestions;
use crate::version::{ReleasePhase, ReleaseVersion, VersionTagIndex};

/// Create, apply, close, attach and detach patches.
pub struct PatchLifecycle {
    ctx: RepoContext,
    status: PatchStatusIndex,
    tags: VersionTagIndex,
}

impl PatchLifecycle {
    pub fn new(ctx: RepoContext) -> Self {
        let status = PatchStatusIndex::new(ctx.patches_dir(), ctx.releases_dir());
        let tags = VersionTagIndex::new(ctx.vcs().clone());
        Self { ctx, status, tags }
    }

    pub fn context(&self) -> &RepoContext {
        &self.ctx
    }

    pub fn status_index(&mut self) -> &mut PatchStatusIndex {
        &mut self.status
    }

    pub fn tag_index(&mut self) -> &mut VersionTagIndex {
        &mut self.tags
    }

    /// Forgets every cached status and tag.
    pub fn invalidate(&mut self) {
        self.status.invalidate();
        self.tags.refresh();
    }

    /// Release version of the current `ho-release/X.Y.Z` branch.
    fn current_release(&self) -> Result<(String, ReleaseVersion)> {
        let branch = self.ctx.vcs().current_branch()?;
        match ReleaseVersion::from_release_branch(&branch) {
            Some(version) => Ok((branch, version)),
            None => Err(suggestions::not_on_release_branch(&branch)),
        }
    }

    /// Stage manifest of `version`, created empty when the release has none.
    fn stage_manifest(&self, version: &ReleaseVersion) -> Result<ReleaseManifest> {
        let dir = self.ctx.releases_dir();
        match ReleaseManifest::open(&dir, version, ReleasePhase::Stage) {
            Err(Error::NotFound { .. }) => {
                ReleaseManifest::create_empty(&dir, version, ReleasePhase::Stage)
            }
            other => other,
        }
    }

    /// Directory of a patch according to the index, or the candidate
    /// location for patches the index does not know.
    fn patch_directory(&mut self, id: &PatchId) -> Result<PathBuf> {
        match self.status.status_of(id)? {
            Some(status) => Ok(self.status.directory_for(id, status)),
            None => Ok(self.status.directory_for(id, PatchStatus::Candidate)),
        }
    }

    /// Every known patch id, for "did you mean" hints.
    fn known_ids(&mut self) -> Result<Vec<PatchId>> {
        Ok(self
            .status
            .records()?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Moves a patch directory with `git mv` when it exists. Returns
    /// whether anything moved.
    fn relocate_directory(&self, from: &Path, to: &Path) -> Result<bool> {
        if !from.is_dir() {
            debug!("{} does not exist, nothing to move", from.display());
            return Ok(false);
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.ctx
            .vcs()
            .mv(&self.ctx.relative(from), &self.ctx.relative(to))?;
        Ok(true)
    }

    /// Publishes a manifest change made on `release_branch`: pushes the
    /// release branch, then copies the manifest into the local branch of
    /// every other candidate of `version`. Returns the number of branches
    /// updated and leaves `release_branch` checked out.
    fn sync_release(
        &mut self,
        version: &ReleaseVersion,
        release_branch: &str,
        manifest_path: &Path,
        exclude: Option<&PatchId>,
    ) -> Result<usize> {
        self.ctx.push_or_warn(release_branch);

        let vcs = self.ctx.vcs().clone();
        let relative = self.ctx.relative(manifest_path);
        let mut notified = 0;
        for id in self.status.candidates_for(version)? {
            if Some(&id) == exclude {
                continue;
            }
            let branch = id.branch_name();
            if !vcs.branch_exists(&branch)? {
                continue;
            }
            let result = vcs
                .checkout(&branch)
                .and_then(|_| vcs.checkout_file_from(release_branch, &relative))
                .and_then(|_| vcs.modified_files())
                .and_then(|modified| {
                    if modified.is_empty() {
                        return Ok(false);
                    }
                    vcs.commit(&format!(
                        "[HOP] Sync release {} manifest from {}",
                        version, release_branch
                    ))?;
                    Ok(true)
                });
            match result {
                Ok(true) => notified += 1,
                Ok(false) => debug!("{} already has the current manifest", branch),
                Err(e) => {
                    warn!("Could not update the manifest on {}: {}", branch, e);
                    // Leave nothing half-done on that branch.
                    if let Err(e) = vcs.discard_changes() {
                        warn!("Could not discard changes on {}: {}", branch, e);
                    }
                }
            }
        }
        vcs.checkout(release_branch)?;
        Ok(notified)
    }

    /// Release manifests (stage or rc) listing `id` as a candidate.
    fn find_candidate_manifest(&self, id: &PatchId) -> Result<ReleaseManifest> {
        for manifest_ref in manifest::discover(&self.ctx.releases_dir())? {
            if manifest_ref.phase == ReleasePhase::Production {
                continue;
            }
            let manifest = ReleaseManifest::load(&manifest_ref.path)?;
            if manifest
                .get_patch_status(id)
                .is_ok_and(|status| status == PatchStatus::Candidate)
            {
                return Ok(manifest);
            }
        }
        Err(suggestions::not_a_candidate(id))
    }
}
