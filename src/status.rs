//! # Patch Status Index
//!
//! [`PatchStatusIndex`] maps every known patch id to its status and owning
//! release without rescanning the repository on each lookup.
//!
//! The map is built lazily from two sources:
//!
//! 1. every release manifest under the releases directory, which is
//!    authoritative (it carries the merge commit of staged patches);
//! 2. the three patch-directory locations, `Patches/`, `Patches/staged/` and
//!    `Patches/orphaned/`, which only contribute ids no manifest mentions.
//!    Their status is implied by the location.
//!
//! Lifecycle operations keep the map current through [`PatchStatusIndex::add_patch`]
//! and [`PatchStatusIndex::update_status`] instead of forcing a rebuild in
//! the middle of a multi-step operation.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::defaults::{ORPHANED_DIR, STAGED_DIR};
use crate::error::{Error, Result};
use crate::manifest::{self, ReleaseManifest};
use crate::patch_id::PatchId;
use crate::version::ReleaseVersion;

/// Where a patch stands relative to its release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchStatus {
    /// Declared in a release, not merged yet.
    Candidate,
    /// Merged into the release branch.
    Staged,
    /// Detached from every release; branch kept for reattachment.
    Orphaned,
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchStatus::Candidate => "candidate",
            PatchStatus::Staged => "staged",
            PatchStatus::Orphaned => "orphaned",
        })
    }
}

/// Cached knowledge about one patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchRecord {
    pub status: PatchStatus,
    pub version: Option<ReleaseVersion>,
    pub merge_commit: Option<String>,
}

impl PatchRecord {
    pub fn new(status: PatchStatus, version: Option<ReleaseVersion>) -> Self {
        Self {
            status,
            version,
            merge_commit: None,
        }
    }
}

/// Lazily built id -> status map.
#[derive(Debug)]
pub struct PatchStatusIndex {
    patches_dir: PathBuf,
    releases_dir: PathBuf,
    map: Option<BTreeMap<PatchId, PatchRecord>>,
}

impl PatchStatusIndex {
    pub fn new(patches_dir: impl Into<PathBuf>, releases_dir: impl Into<PathBuf>) -> Self {
        Self {
            patches_dir: patches_dir.into(),
            releases_dir: releases_dir.into(),
            map: None,
        }
    }

    /// Drops the cached map; the next lookup rebuilds it.
    pub fn invalidate(&mut self) {
        self.map = None;
    }

    /// Rebuilds the map right away.
    pub fn rebuild(&mut self) -> Result<()> {
        self.map = Some(self.build_patch_status_map()?);
        Ok(())
    }

    fn build_patch_status_map(&self) -> Result<BTreeMap<PatchId, PatchRecord>> {
        let mut map = BTreeMap::new();

        for manifest_ref in manifest::discover(&self.releases_dir)? {
            let manifest = ReleaseManifest::load(&manifest_ref.path)?;
            for entry in manifest.entries() {
                map.insert(
                    entry.id.clone(),
                    PatchRecord {
                        status: entry.status,
                        version: Some(manifest_ref.version),
                        merge_commit: entry.merge_commit.clone(),
                    },
                );
            }
        }

        let locations = [
            (self.patches_dir.clone(), PatchStatus::Candidate),
            (self.patches_dir.join(STAGED_DIR), PatchStatus::Staged),
            (self.patches_dir.join(ORPHANED_DIR), PatchStatus::Orphaned),
        ];
        for (dir, status) in locations {
            for id in scan_patch_dirs(&dir)? {
                map.entry(id).or_insert_with(|| PatchRecord::new(status, None));
            }
        }

        debug!("Indexed {} patches", map.len());
        Ok(map)
    }

    fn map(&mut self) -> Result<&mut BTreeMap<PatchId, PatchRecord>> {
        if self.map.is_none() {
            self.rebuild()?;
        }
        Ok(self.map.get_or_insert_with(BTreeMap::new))
    }

    pub fn get(&mut self, id: &PatchId) -> Result<Option<PatchRecord>> {
        Ok(self.map()?.get(id).cloned())
    }

    pub fn status_of(&mut self, id: &PatchId) -> Result<Option<PatchStatus>> {
        Ok(self.map()?.get(id).map(|r| r.status))
    }

    /// Records a patch the cache does not know yet.
    pub fn add_patch(&mut self, id: &PatchId, record: PatchRecord) -> Result<()> {
        let map = self.map()?;
        if map.contains_key(id) {
            return Err(Error::InvalidState {
                patch_id: id.to_string(),
                message: "patch is already known".to_string(),
            });
        }
        map.insert(id.clone(), record);
        Ok(())
    }

    /// Moves a known patch to a new status.
    pub fn update_status(
        &mut self,
        id: &PatchId,
        status: PatchStatus,
        version: Option<ReleaseVersion>,
        merge_commit: Option<String>,
    ) -> Result<()> {
        let record = self
            .map()?
            .get_mut(id)
            .ok_or_else(|| Error::not_found(id.to_string(), "patch is not in the status index"))?;
        record.status = status;
        record.version = version;
        record.merge_commit = merge_commit;
        Ok(())
    }

    /// Directory of a patch. An explicit `status` always wins over the
    /// cache, which lets callers address the destination of a move before
    /// the cache has been updated.
    pub fn get_patch_directory_path(&mut self, id: &PatchId, status: Option<PatchStatus>) -> Result<PathBuf> {
        let status = match status {
            Some(status) => status,
            None => self.status_of(id)?.ok_or_else(|| Error::NotFound {
                resource: id.to_string(),
                message: "unknown patch".to_string(),
                hint: Some("ho-dev status lists every known patch".to_string()),
            })?,
        };
        Ok(self.directory_for(id, status))
    }

    /// Directory implied by `status`, regardless of the cache.
    pub fn directory_for(&self, id: &PatchId, status: PatchStatus) -> PathBuf {
        let base = match status {
            PatchStatus::Candidate => self.patches_dir.clone(),
            PatchStatus::Staged => self.patches_dir.join(STAGED_DIR),
            PatchStatus::Orphaned => self.patches_dir.join(ORPHANED_DIR),
        };
        base.join(id.as_str())
    }

    pub fn patches_with_status(&mut self, status: PatchStatus) -> Result<Vec<PatchId>> {
        Ok(self
            .map()?
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// Candidates of one release.
    pub fn candidates_for(&mut self, version: &ReleaseVersion) -> Result<Vec<PatchId>> {
        Ok(self
            .map()?
            .iter()
            .filter(|(_, r)| r.status == PatchStatus::Candidate && r.version.as_ref() == Some(version))
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// Every known patch, ordered by id.
    pub fn records(&mut self) -> Result<Vec<(PatchId, PatchRecord)>> {
        Ok(self
            .map()?
            .iter()
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect())
    }
}

/// Patch ids of the sub-directories of `dir`. Names that are not patch ids
/// (such as `staged` and `orphaned` themselves) are ignored.
fn scan_patch_dirs(dir: &Path) -> Result<Vec<PatchId>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match PatchId::parse(&name) {
            Ok(id) => ids.push(id),
            Err(_) => debug!("Skipping non-patch directory {}", entry.path().display()),
        }
    }
    Ok(ids)
}
