//! # Release Promotion
//!
//! A release moves `stage -> rc1 -> rc2 -> ... -> production`. Each step
//! renames the manifest with `git mv`, so `git log --follow` on the final
//! `X.Y.Z.toml` shows the whole history of the release:
//!
//! - [`ReleasePromotion::prepare_release`] opens `ho-release/X.Y.Z` from
//!   `ho-prod` with an empty stage manifest,
//! - [`ReleasePromotion::promote_to_rc`] freezes the staged patches as the
//!   next release candidate, tags `vX.Y.Z-rcN` and starts a new empty stage,
//! - [`ReleasePromotion::promote_to_prod`] writes the final manifest, merges
//!   the release into `ho-prod`, tags `vX.Y.Z` and deletes the release
//!   branch.
//!
//! Promotion is refused while a release still has candidates.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::defaults::PROD_BRANCH;
use crate::error::{Error, Result};
use crate::manifest::{self, ReleaseManifest};
use crate::repo::RepoContext;
use crate::status::PatchStatus;
use crate::suggestions;
use crate::version::{self, BumpLevel, ReleasePhase, ReleaseVersion, VersionTagIndex};

/// Outcome of a promotion step.
#[derive(Debug, Clone, Serialize)]
pub struct PromotionReport {
    pub version: ReleaseVersion,
    pub phase: String,
    pub branch: String,
    pub manifest_path: PathBuf,
    /// Tag created by this step, if any.
    pub tag: Option<String>,
    /// False when something could not be pushed; see the warnings.
    pub pushed: bool,
}

/// Target phase of `release promote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionTarget {
    Rc,
    Prod,
}

pub struct ReleasePromotion {
    ctx: RepoContext,
    tags: VersionTagIndex,
}

impl ReleasePromotion {
    pub fn new(ctx: RepoContext) -> Self {
        let tags = VersionTagIndex::new(ctx.vcs().clone());
        Self { ctx, tags }
    }

    /// Opens the next release at `level` from `ho-prod`.
    pub fn prepare_release(&mut self, level: BumpLevel) -> Result<PromotionReport> {
        let vcs = self.ctx.vcs().clone();
        let current = vcs.current_branch()?;
        if current != PROD_BRANCH {
            return Err(Error::validation_with_hint(
                format!("releases are prepared from {}, current branch is {}", PROD_BRANCH, current),
                format!("git checkout {}", PROD_BRANCH),
            ));
        }
        self.ctx.ensure_clean()?;

        let version = self.next_version(level)?;
        let branch = version.release_branch();
        if vcs.branch_exists(&branch)? {
            return Err(Error::validation_with_hint(
                format!("release {} is already prepared", version),
                format!("git checkout {}", branch),
            ));
        }

        vcs.create_branch(&branch, PROD_BRANCH)?;
        vcs.checkout(&branch)?;
        let manifest =
            ReleaseManifest::create_empty(&self.ctx.releases_dir(), &version, ReleasePhase::Stage)?;
        self.ctx.commit_file(manifest.path(), &format!("[HOP] Prepare release {}", version))?;
        let pushed = self.ctx.push_or_warn(&branch);
        info!("Prepared release {} on {}", version, branch);

        Ok(PromotionReport {
            version,
            phase: ReleasePhase::Stage.to_string(),
            branch,
            manifest_path: self.ctx.relative(manifest.path()),
            tag: None,
            pushed,
        })
    }

    /// Next version at `level` after the latest release tag. Patch-level
    /// numbers fill gaps in the line and skip versions that already have a
    /// manifest.
    fn next_version(&mut self, level: BumpLevel) -> Result<ReleaseVersion> {
        let base = self
            .tags
            .latest_release()?
            .unwrap_or_else(|| ReleaseVersion::new(0, 0, 0));
        let prepared: BTreeSet<ReleaseVersion> = manifest::discover(&self.ctx.releases_dir())?
            .into_iter()
            .map(|m| m.version)
            .collect();

        let version = match level {
            BumpLevel::Patch => {
                let line = base.line();
                let mut used = self.tags.get_existing_patch_numbers(&line)?;
                used.extend(
                    prepared
                        .iter()
                        .filter(|v| v.major == base.major && v.minor == base.minor)
                        .map(|v| v.patch),
                );
                let patch = version::next_free_numbers(&used, 1)
                    .first()
                    .copied()
                    .ok_or_else(|| Error::InvalidArgument {
                        message: format!("no free patch number in line {}", line),
                    })?;
                ReleaseVersion::new(base.major, base.minor, patch)
            }
            level => base.bump(level),
        };
        if prepared.contains(&version) {
            return Err(Error::validation(format!(
                "release {} already has a manifest",
                version
            )));
        }
        debug!("Next {:?} release after {} is {}", level, base, version);
        Ok(version)
    }

    /// Promotes `version`, or the release of the current branch.
    pub fn promote(&mut self, target: PromotionTarget, version: Option<&str>) -> Result<PromotionReport> {
        match target {
            PromotionTarget::Rc => self.promote_to_rc(version),
            PromotionTarget::Prod => self.promote_to_prod(version),
        }
    }

    /// Freezes the staged patches of the release as the next candidate.
    pub fn promote_to_rc(&mut self, version: Option<&str>) -> Result<PromotionReport> {
        let (version, branch) = self.release_checkout(version)?;
        let dir = self.ctx.releases_dir();
        let mut stage = ReleaseManifest::open(&dir, &version, ReleasePhase::Stage)?;
        self.ensure_no_candidates(&stage)?;
        if stage.entries().is_empty() {
            return Err(Error::validation(format!(
                "release {} has no staged patch to promote",
                version
            )));
        }

        let n = manifest::discover(&dir)?
            .into_iter()
            .filter_map(|m| match m.phase {
                ReleasePhase::Rc(n) if m.version == version => Some(n),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        let phase = ReleasePhase::Rc(n);
        let stage_path = stage.path().to_path_buf();
        stage.rename_to(phase);
        self.move_file(&stage_path, stage.path())?;
        stage.save()?;
        self.ctx.add_file(stage.path())?;
        let next_stage = ReleaseManifest::create_empty(&dir, &version, ReleasePhase::Stage)?;
        self.ctx.commit_file(
            next_stage.path(),
            &format!("[HOP] Promote release {} to {}", version, phase),
        )?;

        let message = format!("Release {} {}", version, phase);
        let tag = self
            .tags
            .create_version_tag(&format!("{}-{}", version, phase), Some(&message))?;
        let branch_pushed = self.ctx.push_or_warn(&branch);
        let tag_pushed = self.ctx.push_tag_or_warn(&tag);
        info!("Promoted release {} to {}", version, phase);

        Ok(PromotionReport {
            version,
            phase: phase.to_string(),
            branch,
            manifest_path: self.ctx.relative(stage.path()),
            tag: Some(tag),
            pushed: branch_pushed && tag_pushed,
        })
    }

    /// Ships the release: final manifest, merge into `ho-prod`, tag, and
    /// deletion of the release branch.
    pub fn promote_to_prod(&mut self, version: Option<&str>) -> Result<PromotionReport> {
        let (version, branch) = self.release_checkout(version)?;
        let dir = self.ctx.releases_dir();
        let stage = ReleaseManifest::open(&dir, &version, ReleasePhase::Stage)?;
        self.ensure_no_candidates(&stage)?;
        if self.tags.check_version_exists(&version.to_string())? {
            return Err(Error::validation(format!(
                "tag {} already exists",
                version.tag_name()
            )));
        }

        // Final manifest: every rc in order, then what is left in stage.
        let mut production: Option<ReleaseManifest> = None;
        for manifest_ref in manifest::discover(&dir)?
            .into_iter()
            .filter(|m| m.version == version && matches!(m.phase, ReleasePhase::Rc(_)))
        {
            let rc = ReleaseManifest::load(&manifest_ref.path)?;
            match production.as_mut() {
                Some(production) => production.extend_from(&rc)?,
                None => production = Some(rc),
            }
        }
        let mut production = match production {
            Some(mut production) => {
                production.rename_to(ReleasePhase::Production);
                production.extend_from(&stage)?;
                production
            }
            None => {
                let mut production = stage.clone();
                production.rename_to(ReleasePhase::Production);
                production
            }
        };
        self.move_file(stage.path(), production.path())?;
        production.save()?;
        self.ctx.commit_file(production.path(), &format!("[HOP] Release {}", version))?;

        let vcs = self.ctx.vcs().clone();
        vcs.checkout(PROD_BRANCH)?;
        vcs.merge(&branch, &format!("[HOP] Merge release {}", version))?;
        let tag = self
            .tags
            .create_version_tag(&version.to_string(), Some(&format!("Release {}", version)))?;
        let branch_pushed = self.ctx.push_or_warn(PROD_BRANCH);
        let tag_pushed = self.ctx.push_tag_or_warn(&tag);

        vcs.delete_branch(&branch)?;
        if let Err(e) = vcs.delete_remote_branch(&branch) {
            warn!("Could not delete the remote branch {}: {}", branch, e);
        }
        info!("Released {}", version);

        Ok(PromotionReport {
            version,
            phase: ReleasePhase::Production.to_string(),
            branch: PROD_BRANCH.to_string(),
            manifest_path: self.ctx.relative(production.path()),
            tag: Some(tag),
            pushed: branch_pushed && tag_pushed,
        })
    }

    /// Resolves the release to promote and checks its branch is checked
    /// out and clean.
    fn release_checkout(&self, version: Option<&str>) -> Result<(ReleaseVersion, String)> {
        let current = self.ctx.vcs().current_branch()?;
        let version = match version {
            Some(version) => ReleaseVersion::parse(version)?,
            None => ReleaseVersion::from_release_branch(&current)
                .ok_or_else(|| suggestions::not_on_release_branch(&current))?,
        };
        let branch = version.release_branch();
        if current != branch {
            return Err(Error::validation_with_hint(
                format!("promoting {} requires {}, current branch is {}", version, branch, current),
                format!("git checkout {}", branch),
            ));
        }
        self.ctx.ensure_clean()?;
        Ok((version, branch))
    }

    fn ensure_no_candidates(&self, stage: &ReleaseManifest) -> Result<()> {
        let candidates = stage.get_patches(Some(PatchStatus::Candidate));
        if candidates.is_empty() {
            Ok(())
        } else {
            Err(suggestions::candidates_remain(stage.version(), &candidates))
        }
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        self.ctx
            .vcs()
            .mv(&self.ctx.relative(from), &self.ctx.relative(to))
    }
}
