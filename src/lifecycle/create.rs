//! `create`: reserve a patch number and open its working branch.
//!
//! The patch number is claimed by pushing the reservation tag
//! `ho-patch/<number>`; the remote accepts a given tag name once, which is
//! what makes numbers unique across developers. Steps, in order:
//!
//! 1. validate (release branch, clean tree, remote, unused id),
//! 2. fetch tags and check the reservation tag is free,
//! 3. register the id as a candidate in the stage manifest, committed on
//!    the release branch,
//! 4. create and check out `ho-patch/<id>`, tag it,
//! 5. push the tag (the reservation itself),
//! 6. push the branch (a failure only warns),
//! 7. create the patch directory and commit it,
//! 8. publish the release branch (a failure only warns).
//!
//! Any failure in steps 3-7 other than the branch push rolls back
//! everything done so far, remote refs included.

use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};
use serde::Serialize;

use super::PatchLifecycle;
use crate::cleanup::Cleanup;
use crate::error::{Error, Result};
use crate::manifest::ReleaseManifest;
use crate::patch_dir;
use crate::patch_id::PatchId;
use crate::status::{PatchRecord, PatchStatus};
use crate::suggestions;
use crate::version::{ReleasePhase, ReleaseVersion};

/// Resources created by a successful `create`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub patch_id: PatchId,
    pub version: ReleaseVersion,
    pub branch: String,
    pub reservation_tag: String,
    pub directory: PathBuf,
    /// False when the branch could not be pushed; the reservation holds
    /// regardless and the branch can be pushed by hand.
    pub branch_pushed: bool,
    pub on_branch: bool,
}

/// What has been done so far, so a failure undoes exactly that.
#[derive(Debug, Default)]
struct Progress {
    manifest_created: Option<PathBuf>,
    manifest_written: bool,
    branch_created: bool,
    checked_out: bool,
    tag_created: bool,
    tag_pushed: bool,
    branch_pushed: bool,
    directory: Option<PathBuf>,
}

impl PatchLifecycle {
    /// Creates patch `id` on the current release branch.
    pub fn create(&mut self, id: &str, description: Option<&str>) -> Result<CreateReport> {
        let id = PatchId::parse(id)?;
        let vcs = self.ctx.vcs().clone();

        let (initial_branch, version) = self.current_release()?;
        self.ctx.ensure_clean()?;
        if !vcs.has_remote()? {
            return Err(suggestions::missing_remote(self.ctx.remote()));
        }
        let directory = self.status.directory_for(&id, PatchStatus::Candidate);
        if directory.exists() {
            return Err(Error::validation(format!(
                "patch directory {} already exists",
                self.ctx.relative(&directory).display()
            )));
        }
        if let Some(record) = self.status.get(&id)? {
            return Err(Error::InvalidState {
                patch_id: id.to_string(),
                message: format!("patch already exists as {}", record.status),
            });
        }
        let branch = id.branch_name();
        if vcs.branch_exists(&branch)? {
            return Err(Error::validation_with_hint(
                format!("branch {} already exists", branch),
                format!("git checkout {}", branch),
            ));
        }

        debug!("Fetching tags before reserving {}", id.reservation_tag());
        vcs.fetch_tags()?;
        self.tags.refresh();
        if vcs.tag_exists(&id.reservation_tag())? {
            return Err(suggestions::reservation_conflict(&id));
        }

        let base_commit = vcs.head_commit()?;
        let mut progress = Progress::default();
        match self.reserve(&id, &version, description, &mut progress) {
            Ok(report) => {
                info!("Created patch {} for release {}", id, version);
                Ok(report)
            }
            Err(e) => {
                self.rollback_create(&id, &initial_branch, &base_commit, &progress);
                Err(e)
            }
        }
    }

    fn reserve(
        &mut self,
        id: &PatchId,
        version: &ReleaseVersion,
        description: Option<&str>,
        progress: &mut Progress,
    ) -> Result<CreateReport> {
        let vcs = self.ctx.vcs().clone();
        let branch = id.branch_name();
        let tag = id.reservation_tag();
        let release_branch = version.release_branch();

        let stage_path =
            ReleaseManifest::path_for(&self.ctx.releases_dir(), version, ReleasePhase::Stage);
        if !stage_path.exists() {
            progress.manifest_created = Some(stage_path);
        }
        let mut manifest = self.stage_manifest(version)?;
        manifest.add_patch(id)?;
        progress.manifest_written = true;
        manifest.save()?;
        self.ctx.commit_file(
            manifest.path(),
            &format!("[HOP] Register patch {} for release {}", id, version),
        )?;

        vcs.create_branch(&branch, "HEAD")?;
        progress.branch_created = true;
        vcs.checkout(&branch)?;
        progress.checked_out = true;
        vcs.create_tag(&tag, None)?;
        progress.tag_created = true;

        vcs.push_tag(&tag).map_err(|e| {
            if e.is_remote_rejection() {
                suggestions::reservation_conflict(id)
            } else {
                e
            }
        })?;
        progress.tag_pushed = true;
        debug!("Reserved patch number {} with {}", id.number(), tag);

        progress.branch_pushed = self.ctx.push_or_warn(&branch);

        let directory = self.status.directory_for(id, PatchStatus::Candidate);
        progress.directory = Some(directory.clone());
        patch_dir::create_patch_directory(&directory, id, description)?;
        self.ctx.commit_file(&directory, &format!("[HOP] Create patch {}", id))?;

        // The branch went out before the directory commit; bring it up to date.
        let mut branch_pushed = progress.branch_pushed;
        if branch_pushed {
            branch_pushed = self.ctx.push_or_warn(&branch);
        }
        self.ctx.push_or_warn(&release_branch);

        self.status.add_patch(
            id,
            PatchRecord::new(PatchStatus::Candidate, Some(*version)),
        )?;

        Ok(CreateReport {
            patch_id: id.clone(),
            version: *version,
            branch: branch.clone(),
            reservation_tag: tag,
            directory,
            branch_pushed,
            on_branch: vcs.current_branch()? == branch,
        })
    }

    /// Undoes a failed `create`. Every step is attempted; failures are
    /// logged and never replace the error that caused the rollback.
    fn rollback_create(
        &mut self,
        id: &PatchId,
        initial_branch: &str,
        base_commit: &str,
        progress: &Progress,
    ) {
        warn!("Creating patch {} failed, rolling back", id);
        let vcs = self.ctx.vcs().clone();
        let branch = id.branch_name();
        let tag = id.reservation_tag();
        let mut cleanup = Cleanup::new(format!("rollback of patch {}", id));

        if progress.checked_out {
            cleanup.step(&format!("check out {}", initial_branch), || {
                vcs.checkout(initial_branch)
            });
        }
        if progress.branch_created {
            cleanup.step(&format!("delete branch {}", branch), || {
                vcs.delete_branch(&branch)
            });
        }
        if progress.tag_created {
            cleanup.step(&format!("delete tag {}", tag), || vcs.delete_tag(&tag));
        }
        if progress.tag_pushed {
            cleanup.step(&format!("delete remote tag {}", tag), || {
                vcs.delete_remote_tag(&tag)
            });
        }
        if progress.branch_pushed {
            cleanup.step(&format!("delete remote branch {}", branch), || {
                vcs.delete_remote_branch(&branch)
            });
        }
        if progress.manifest_written {
            // Resetting is only safe while the release branch is checked out.
            cleanup.step(&format!("reset {} to {}", initial_branch, base_commit), || {
                let current = vcs.current_branch()?;
                if current != initial_branch {
                    return Err(Error::validation(format!(
                        "{} is checked out instead of {}",
                        current, initial_branch
                    )));
                }
                vcs.reset_hard(base_commit)
            });
        }
        if let Some(path) = &progress.manifest_created {
            if path.exists() {
                cleanup.step(&format!("remove {}", path.display()), || {
                    fs::remove_file(path).map_err(Error::from)
                });
            }
        }
        if let Some(directory) = &progress.directory {
            if directory.exists() {
                cleanup.step(&format!("remove {}", directory.display()), || {
                    fs::remove_dir_all(directory).map_err(Error::from)
                });
            }
        }
        cleanup.finish();
        self.status.invalidate();
    }
}
