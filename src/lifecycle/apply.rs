//! `apply`: rebuild the database for one patch and regenerate the code.
//!
//! The database is restored from the committed schema dump, then every
//! patch of the release context is applied in manifest order, then the
//! code generator runs. The target patch runs at its position in the
//! context, or last when it belongs to no release. Starting from the dump
//! every time is what makes `apply` repeatable.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde::Serialize;

use super::PatchLifecycle;
use crate::cleanup::Cleanup;
use crate::error::{Error, Result};
use crate::manifest::{self, ReleaseManifest};
use crate::patch_dir::{self, PatchFileKind};
use crate::patch_id::PatchId;
use crate::status::PatchStatus;
use crate::version::{ReleasePhase, ReleaseVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStatus {
    Success,
    Failed,
}

/// Outcome of `apply`.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub patch_id: PatchId,
    pub version: Option<ReleaseVersion>,
    /// Files of the other patches of the release context, as `<id>/<file>`.
    pub applied_release_files: Vec<String>,
    /// Files of the target patch, as `<id>/<file>`.
    pub applied_current_files: Vec<String>,
    /// Files rewritten by the code generator, relative to the root.
    pub generated_files: Vec<String>,
    pub patch_was_in_release: bool,
    pub status: ApplyStatus,
    pub error: Option<String>,
}

impl ApplyReport {
    fn new(patch_id: PatchId, version: Option<ReleaseVersion>, patch_was_in_release: bool) -> Self {
        Self {
            patch_id,
            version,
            applied_release_files: Vec::new(),
            applied_current_files: Vec::new(),
            generated_files: Vec::new(),
            patch_was_in_release,
            status: ApplyStatus::Success,
            error: None,
        }
    }

    /// Report for an `apply` that failed with `error`.
    pub fn failed(patch_id: PatchId, error: &Error) -> Self {
        Self {
            status: ApplyStatus::Failed,
            error: Some(error.to_string()),
            ..Self::new(patch_id, None, false)
        }
    }

    pub fn applied_count(&self) -> usize {
        self.applied_release_files.len() + self.applied_current_files.len()
    }
}

impl PatchLifecycle {
    /// Applies `id`, or the patch of the current `ho-patch/*` branch.
    pub fn apply(&mut self, id: Option<&str>) -> Result<ApplyReport> {
        let id = match id {
            Some(id) => PatchId::parse(id)?,
            None => PatchId::from_branch(&self.ctx.vcs().current_branch()?)?,
        };

        let version = self.context_version(&id)?;
        let context = match &version {
            Some(version) => manifest::release_context(&self.ctx.releases_dir(), version)?,
            None => Vec::new(),
        };
        let target_dir = self.patch_directory(&id)?;
        patch_dir::ensure_patch_directory(&id, &target_dir)?;

        let mut report = ApplyReport::new(id.clone(), version, context.contains(&id));
        debug!(
            "Applying {} with a release context of {} patches",
            id,
            context.len()
        );

        match self.rebuild(&id, &context, &mut report) {
            Ok(()) => {
                info!("Applied {} ({} files)", id, report.applied_count());
                Ok(report)
            }
            Err(e) => {
                let database = self.ctx.database().clone();
                let schema = self.ctx.schema_file();
                let mut cleanup = Cleanup::new(format!("rollback of apply {}", id));
                cleanup.step("restore the database schema", || {
                    database.restore_schema(&schema)
                });
                cleanup.finish();
                Err(e)
            }
        }
    }

    /// Release whose context `id` is applied in: the release owning `id`,
    /// else the release of the current branch, else the newest release
    /// with a stage manifest.
    fn context_version(&mut self, id: &PatchId) -> Result<Option<ReleaseVersion>> {
        if let Some(version) = self.status.get(id)?.and_then(|record| record.version) {
            return Ok(Some(version));
        }
        let branch = self.ctx.vcs().current_branch()?;
        if let Some(version) = ReleaseVersion::from_release_branch(&branch) {
            return Ok(Some(version));
        }
        Ok(manifest::discover(&self.ctx.releases_dir())?
            .into_iter()
            .filter(|m| m.phase == ReleasePhase::Stage)
            .map(|m| m.version)
            .max())
    }

    fn rebuild(&mut self, id: &PatchId, context: &[PatchId], report: &mut ApplyReport) -> Result<()> {
        self.ctx.database().restore_schema(&self.ctx.schema_file())?;

        for patch in context {
            let dir = self.patch_directory(patch)?;
            if patch == id {
                report.applied_current_files = self.apply_patch_files(patch, &dir)?;
                continue;
            }
            if !dir.is_dir() {
                warn!(
                    "Skipping {}: {} is not in this working tree",
                    patch,
                    self.ctx.relative(&dir).display()
                );
                continue;
            }
            let applied = self.apply_patch_files(patch, &dir)?;
            report.applied_release_files.extend(applied);
        }
        if !report.patch_was_in_release {
            let dir = self.patch_directory(id)?;
            report.applied_current_files = self.apply_patch_files(id, &dir)?;
        }

        report.generated_files = self.regenerate()?;
        Ok(())
    }

    /// Runs the executable files of one patch directory in order.
    fn apply_patch_files(&self, id: &PatchId, dir: &Path) -> Result<Vec<String>> {
        let mut applied = Vec::new();
        for file in patch_dir::patch_files(dir)? {
            debug!("Applying {}/{}", id, file.name);
            match file.kind {
                PatchFileKind::Sql => {
                    let sql = fs::read_to_string(&file.path)?;
                    self.ctx.database().execute_query(&sql)?;
                }
                PatchFileKind::Python => self.ctx.scripts().run_script(&file.path, dir)?,
            }
            applied.push(format!("{}/{}", id, file.name));
        }
        Ok(applied)
    }

    fn regenerate(&self) -> Result<Vec<String>> {
        Ok(self
            .ctx
            .codegen()
            .generate(self.ctx.root())?
            .into_iter()
            .map(|path| path.to_string_lossy().replace('\\', "/"))
            .collect())
    }

    /// Applies the staged patches of `version` in manifest order, then
    /// `id`, from a freshly restored database.
    pub(super) fn replay_staged_then(&mut self, version: &ReleaseVersion, id: &PatchId) -> Result<()> {
        self.ctx.database().restore_schema(&self.ctx.schema_file())?;
        for patch in self.staged_patches(version)? {
            if &patch == id {
                continue;
            }
            let dir = self.patch_directory(&patch)?;
            if !dir.is_dir() {
                warn!("Skipping staged patch {}: directory missing", patch);
                continue;
            }
            self.apply_patch_files(&patch, &dir)?;
        }
        let dir = self.status.directory_for(id, PatchStatus::Candidate);
        patch_dir::ensure_patch_directory(id, &dir)?;
        self.apply_patch_files(id, &dir)?;
        self.regenerate()?;
        Ok(())
    }

    fn staged_patches(&self, version: &ReleaseVersion) -> Result<Vec<PatchId>> {
        let mut staged = Vec::new();
        for manifest_ref in manifest::discover(&self.ctx.releases_dir())?
            .into_iter()
            .filter(|m| &m.version == version && m.phase != ReleasePhase::Production)
        {
            let manifest = ReleaseManifest::load(&manifest_ref.path)?;
            for id in manifest.get_patches(Some(PatchStatus::Staged)) {
                if !staged.contains(&id) {
                    staged.push(id);
                }
            }
        }
        Ok(staged)
    }
}
