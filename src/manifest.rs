//! # Release Manifests
//!
//! A release manifest is the durable record of which patches belong to one
//! release version, and whether each of them is still a `candidate` or has
//! been `staged` (merged into the release branch, with the merge commit
//! recorded).
//!
//! There is one file per `(version, phase)` pair under the releases
//! directory. The phase is encoded in the file *name*, never in its content,
//! so promoting a release is a history-preserving rename:
//!
//! | Phase      | File name             |
//! |------------|-----------------------|
//! | stage      | `0.17.0-stage.toml`   |
//! | rc N       | `0.17.0-rcN.toml`     |
//! | production | `0.17.0.toml`         |
//!
//! ## Format
//!
//! ```toml
//! [patches.456-user-auth]
//! status = "staged"
//! merge_commit = "9f2c4e1"
//!
//! [patches.457]
//! status = "candidate"
//! ```
//!
//! Entry order is significant: it is the default application order of the
//! release. Older repositories used flat-text manifests (same stems, `.txt`
//! extension, one id per line, `#` comments); those are still read, their
//! entries count as staged, and they are never written.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::patch_id::PatchId;
use crate::status::PatchStatus;
use crate::version::{ReleasePhase, ReleaseVersion};

const TOML_EXTENSION: &str = "toml";
const LEGACY_EXTENSION: &str = "txt";

/// On-disk encoding of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    /// Read-only flat-text format.
    Legacy,
}

impl ManifestFormat {
    fn extension(self) -> &'static str {
        match self {
            ManifestFormat::Toml => TOML_EXTENSION,
            ManifestFormat::Legacy => LEGACY_EXTENSION,
        }
    }
}

/// One patch recorded in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: PatchId,
    pub status: PatchStatus,
    pub merge_commit: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    status: PatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merge_commit: Option<String>,
}

/// Builds the file name for a manifest.
pub fn file_name(version: &ReleaseVersion, phase: ReleasePhase, format: ManifestFormat) -> String {
    let ext = format.extension();
    match phase {
        ReleasePhase::Stage => format!("{}-stage.{}", version, ext),
        ReleasePhase::Rc(n) => format!("{}-rc{}.{}", version, n, ext),
        ReleasePhase::Production => format!("{}.{}", version, ext),
    }
}

/// Recognizes a manifest file name.
pub fn parse_file_name(name: &str) -> Option<(ReleaseVersion, ReleasePhase, ManifestFormat)> {
    let (stem, format) = if let Some(stem) = name.strip_suffix(".toml") {
        (stem, ManifestFormat::Toml)
    } else if let Some(stem) = name.strip_suffix(".txt") {
        (stem, ManifestFormat::Legacy)
    } else {
        return None;
    };

    let (version, phase) = match stem.split_once('-') {
        None => (stem, ReleasePhase::Production),
        Some((version, "stage")) => (version, ReleasePhase::Stage),
        Some((version, suffix)) => {
            let n = suffix.strip_prefix("rc")?.parse::<u32>().ok()?;
            if n == 0 {
                return None;
            }
            (version, ReleasePhase::Rc(n))
        }
    };
    let version = ReleaseVersion::parse(version).ok()?;
    // Reject non-canonical spellings such as "v1.2.3" or "01.2.3".
    if version.to_string() != stem.split('-').next().unwrap_or_default() {
        return None;
    }
    Some((version, phase, format))
}

/// A manifest file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRef {
    pub path: PathBuf,
    pub version: ReleaseVersion,
    pub phase: ReleasePhase,
    pub format: ManifestFormat,
}

/// Lists every manifest under `dir`, sorted by version then phase. When
/// both encodings exist for the same release phase the TOML file wins.
pub fn discover(dir: &Path) -> Result<Vec<ManifestRef>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found: Vec<ManifestRef> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some((version, phase, format)) = parse_file_name(&name.to_string_lossy()) else {
            continue;
        };
        found.push(ManifestRef {
            path: entry.path(),
            version,
            phase,
            format,
        });
    }
    // Toml sorts before Legacy for the same release phase, then dedup keeps it.
    found.sort_by_key(|m| (m.version, m.phase, m.format == ManifestFormat::Legacy));
    found.dedup_by(|later, earlier| later.version == earlier.version && later.phase == earlier.phase);
    Ok(found)
}

/// Ordered candidate and staged patches of `version`: every rc manifest in
/// sequence, then the stage manifest. An id listed twice keeps its first
/// position.
pub fn release_context(dir: &Path, version: &ReleaseVersion) -> Result<Vec<PatchId>> {
    let mut context: Vec<PatchId> = Vec::new();
    for manifest_ref in discover(dir)?
        .into_iter()
        .filter(|m| &m.version == version && m.phase != ReleasePhase::Production)
    {
        let manifest = ReleaseManifest::load(&manifest_ref.path)?;
        for id in manifest.get_patches(None) {
            if !context.contains(&id) {
                context.push(id);
            }
        }
    }
    Ok(context)
}

/// The patches of one release phase.
#[derive(Debug, Clone)]
pub struct ReleaseManifest {
    path: PathBuf,
    version: ReleaseVersion,
    phase: ReleasePhase,
    format: ManifestFormat,
    entries: Vec<ManifestEntry>,
}

impl ReleaseManifest {
    /// Where the TOML manifest of `(version, phase)` lives.
    pub fn path_for(dir: &Path, version: &ReleaseVersion, phase: ReleasePhase) -> PathBuf {
        dir.join(file_name(version, phase, ManifestFormat::Toml))
    }

    /// Creates and writes an empty manifest. Fails if a manifest for the
    /// same version and phase already exists in either format.
    pub fn create_empty(dir: &Path, version: &ReleaseVersion, phase: ReleasePhase) -> Result<Self> {
        let path = Self::path_for(dir, version, phase);
        let legacy = dir.join(file_name(version, phase, ManifestFormat::Legacy));
        if path.exists() || legacy.exists() {
            return Err(Error::Manifest {
                path: path.display().to_string(),
                message: format!("a {} manifest for {} already exists", phase, version),
            });
        }
        fs::create_dir_all(dir)?;
        let manifest = Self {
            path,
            version: *version,
            phase,
            format: ManifestFormat::Toml,
            entries: Vec::new(),
        };
        manifest.save()?;
        debug!("Created manifest {}", manifest.path.display());
        Ok(manifest)
    }

    /// Loads the manifest of `(version, phase)`, falling back to the legacy
    /// flat-text file.
    pub fn open(dir: &Path, version: &ReleaseVersion, phase: ReleasePhase) -> Result<Self> {
        let path = Self::path_for(dir, version, phase);
        if path.exists() {
            return Self::load(&path);
        }
        let legacy = dir.join(file_name(version, phase, ManifestFormat::Legacy));
        if legacy.exists() {
            return Self::load(&legacy);
        }
        Err(Error::NotFound {
            resource: path.display().to_string(),
            message: format!("no {} manifest for release {}", phase, version),
            hint: Some(format!("ho-dev release prepare, or check out ho-release/{}", version)),
        })
    }

    /// Loads a manifest file; version, phase and format come from its name.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (version, phase, format) = parse_file_name(&name).ok_or_else(|| Error::Manifest {
            path: path.display().to_string(),
            message: "file name is not <version>[-stage|-rcN].toml".to_string(),
        })?;
        let content = fs::read_to_string(path)?;
        let entries = match format {
            ManifestFormat::Toml => parse_toml(path, &content)?,
            ManifestFormat::Legacy => parse_legacy(path, &content)?,
        };
        Ok(Self {
            path: path.to_path_buf(),
            version,
            phase,
            format,
            entries,
        })
    }

    /// Writes the manifest back to its file.
    pub fn save(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut patches = toml::Table::new();
        for entry in &self.entries {
            let record = EntryRecord {
                status: entry.status,
                merge_commit: entry.merge_commit.clone(),
            };
            patches.insert(entry.id.to_string(), toml::Value::try_from(record)?);
        }
        let mut root = toml::Table::new();
        root.insert("patches".to_string(), toml::Value::Table(patches));
        let header = format!("# Patches of release {} ({})\n", self.version, self.phase);
        fs::write(&self.path, header + &toml::to_string(&root)?)?;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.format == ManifestFormat::Legacy {
            return Err(Error::Manifest {
                path: self.path.display().to_string(),
                message: "legacy flat-text manifests are read-only".to_string(),
            });
        }
        Ok(())
    }

    fn position(&self, id: &PatchId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    /// Appends `id` as a candidate.
    pub fn add_patch(&mut self, id: &PatchId) -> Result<()> {
        self.ensure_writable()?;
        if let Some(pos) = self.position(id) {
            return Err(Error::Manifest {
                path: self.path.display().to_string(),
                message: format!(
                    "patch {} is already listed as {}",
                    id, self.entries[pos].status
                ),
            });
        }
        self.entries.push(ManifestEntry {
            id: id.clone(),
            status: PatchStatus::Candidate,
            merge_commit: None,
        });
        Ok(())
    }

    /// Marks a candidate as staged and records its merge commit.
    pub fn move_to_staged(&mut self, id: &PatchId, merge_commit: &str) -> Result<()> {
        self.ensure_writable()?;
        let path = self.path.display().to_string();
        let entry = self
            .entries
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| Error::Manifest {
                path: path.clone(),
                message: format!("patch {} is not listed", id),
            })?;
        if entry.status != PatchStatus::Candidate {
            return Err(Error::InvalidState {
                patch_id: id.to_string(),
                message: format!("only candidates can be staged, it is {}", entry.status),
            });
        }
        entry.status = PatchStatus::Staged;
        entry.merge_commit = Some(merge_commit.to_string());
        Ok(())
    }

    /// Drops a candidate from the release.
    pub fn remove_patch(&mut self, id: &PatchId) -> Result<()> {
        self.ensure_writable()?;
        let pos = self.position(id).ok_or_else(|| Error::Manifest {
            path: self.path.display().to_string(),
            message: format!("patch {} is not listed", id),
        })?;
        if self.entries[pos].status != PatchStatus::Candidate {
            return Err(Error::InvalidState {
                patch_id: id.to_string(),
                message: format!(
                    "only candidates can leave a release, it is {}",
                    self.entries[pos].status
                ),
            });
        }
        self.entries.remove(pos);
        Ok(())
    }

    /// Patch ids in manifest order, optionally only those with `status`.
    pub fn get_patches(&self, status: Option<PatchStatus>) -> Vec<PatchId> {
        self.entries
            .iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn get_patch_status(&self, id: &PatchId) -> Result<PatchStatus> {
        self.position(id)
            .map(|pos| self.entries[pos].status)
            .ok_or_else(|| Error::not_found(id.to_string(), format!("not listed in {}", self.path.display())))
    }

    pub fn contains(&self, id: &PatchId) -> bool {
        self.position(id).is_some()
    }

    pub fn merge_commit(&self, id: &PatchId) -> Option<&str> {
        self.position(id)
            .and_then(|pos| self.entries[pos].merge_commit.as_deref())
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Appends entries taken from another manifest of the same release,
    /// skipping ids already present.
    pub fn extend_from(&mut self, other: &ReleaseManifest) -> Result<()> {
        self.ensure_writable()?;
        for entry in other.entries() {
            if !self.contains(&entry.id) {
                self.entries.push(entry.clone());
            }
        }
        Ok(())
    }

    /// Re-targets this manifest at another phase of the same release; the
    /// caller moves the file itself (through `git mv`) before saving.
    pub fn rename_to(&mut self, phase: ReleasePhase) {
        if let Some(dir) = self.path.parent() {
            self.path = Self::path_for(dir, &self.version, phase);
        }
        self.phase = phase;
        self.format = ManifestFormat::Toml;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &ReleaseVersion {
        &self.version
    }

    pub fn phase(&self) -> ReleasePhase {
        self.phase
    }

    pub fn format(&self) -> ManifestFormat {
        self.format
    }
}

fn parse_toml(path: &Path, content: &str) -> Result<Vec<ManifestEntry>> {
    let mut root: toml::Table = toml::from_str(content)?;
    let patches = match root.remove("patches") {
        None => return Ok(Vec::new()),
        Some(toml::Value::Table(patches)) => patches,
        Some(_) => {
            return Err(Error::Manifest {
                path: path.display().to_string(),
                message: "'patches' must be a table".to_string(),
            })
        }
    };

    let mut entries = Vec::with_capacity(patches.len());
    for (key, value) in patches {
        let id = PatchId::parse(&key).map_err(|e| Error::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let record = value.try_into::<EntryRecord>().map_err(|e| Error::Manifest {
            path: path.display().to_string(),
            message: format!("entry {}: {}", key, e),
        })?;
        if record.status == PatchStatus::Orphaned {
            return Err(Error::Manifest {
                path: path.display().to_string(),
                message: format!("entry {}: orphaned patches do not belong to a release", key),
            });
        }
        entries.push(ManifestEntry {
            id,
            status: record.status,
            merge_commit: record.merge_commit,
        });
    }
    Ok(entries)
}

fn parse_legacy(path: &Path, content: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries: Vec<ManifestEntry> = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let id = PatchId::parse(line).map_err(|e| Error::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if entries.iter().any(|e| e.id == id) {
            continue;
        }
        entries.push(ManifestEntry {
            id,
            status: PatchStatus::Staged,
            merge_commit: None,
        });
    }
    Ok(entries)
}
