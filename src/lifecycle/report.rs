//! Overview of every known patch, grouped by release.

use serde::Serialize;

use super::PatchLifecycle;
use crate::error::Result;
use crate::manifest::{self, ReleaseManifest};
use crate::patch_id::PatchId;
use crate::status::PatchStatus;
use crate::version::ReleaseVersion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchSummary {
    pub id: PatchId,
    pub status: PatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
}

/// Patches of one release, in application order.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseSummary {
    pub version: ReleaseVersion,
    /// Latest phase the release reached.
    pub phase: String,
    pub patches: Vec<PatchSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub current_branch: String,
    pub releases: Vec<ReleaseSummary>,
    pub orphaned: Vec<PatchId>,
    /// Patch directories that no manifest lists.
    pub unassigned: Vec<PatchSummary>,
}

impl PatchLifecycle {
    /// Every known patch, grouped by release.
    pub fn status_report(&mut self) -> Result<StatusReport> {
        let mut releases: Vec<ReleaseSummary> = Vec::new();
        for manifest_ref in manifest::discover(&self.ctx.releases_dir())? {
            let manifest = ReleaseManifest::load(&manifest_ref.path)?;
            let summaries = manifest.entries().iter().map(|entry| PatchSummary {
                id: entry.id.clone(),
                status: entry.status,
                merge_commit: entry.merge_commit.clone(),
            });
            let phase = manifest_ref.phase.to_string();
            match releases.last_mut() {
                Some(release) if release.version == manifest_ref.version => {
                    // Discovery order is rc1, rc2, ..., stage, production.
                    release.phase = phase;
                    for summary in summaries {
                        if !release.patches.iter().any(|p| p.id == summary.id) {
                            release.patches.push(summary);
                        }
                    }
                }
                _ => releases.push(ReleaseSummary {
                    version: manifest_ref.version,
                    phase,
                    patches: summaries.collect(),
                }),
            }
        }

        let mut orphaned = Vec::new();
        let mut unassigned = Vec::new();
        for (id, record) in self.status.records()? {
            if record.status == PatchStatus::Orphaned {
                orphaned.push(id);
            } else if record.version.is_none() {
                unassigned.push(PatchSummary {
                    id,
                    status: record.status,
                    merge_commit: record.merge_commit,
                });
            }
        }

        Ok(StatusReport {
            current_branch: self.ctx.vcs().current_branch()?,
            releases,
            orphaned,
            unassigned,
        })
    }
}

