//! # Release Versions and the Version Tag Index
//!
//! Releases are numbered `X.Y.Z`. All releases sharing `X.Y` form a
//! *maintenance line*; the `Z` of a line is called its patch number.
//!
//! [`VersionTagIndex`] answers two questions purely from Git tag names:
//! which patch numbers of a line are already used, and which are free next.
//! Free numbers fill the holes left below the highest used number before the
//! sequence is extended, so a line stays dense even when releases were
//! created by hand outside this tool.
//!
//! Tag enumeration is memoized per index; every tag mutation made through
//! the index invalidates the memo, and [`VersionTagIndex::refresh`] drops it
//! on demand.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::debug;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::defaults::RELEASE_PREFIX;
use crate::error::{Error, Result};
use crate::git::VersionControl;

/// A final release version, `X.Y.Z` without pre-release or build parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ReleaseVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `X.Y.Z`, tolerating a leading `v`.
    pub fn parse(input: &str) -> Result<Self> {
        let version = parse_semver_tag(input).ok_or_else(|| Error::Validation {
            message: format!("invalid release version '{}': expected X.Y.Z", input),
            hint: None,
        })?;
        if !version.pre.is_empty() || !version.build.is_empty() {
            return Err(Error::validation(format!(
                "release version '{}' must not carry a pre-release or build suffix",
                input
            )));
        }
        Ok(Self::new(version.major, version.minor, version.patch))
    }

    /// Extracts the version from a `ho-release/X.Y.Z` branch name.
    pub fn from_release_branch(branch: &str) -> Option<Self> {
        branch
            .strip_prefix(RELEASE_PREFIX)
            .and_then(|v| Self::parse(v).ok())
    }

    /// The maintenance line, `X.Y`.
    pub fn line(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    pub fn release_branch(&self) -> String {
        format!("{}{}", RELEASE_PREFIX, self)
    }

    /// Tag marking this version in production.
    pub fn tag_name(&self) -> String {
        format!("v{}", self)
    }

    /// Tag marking the `n`th release candidate.
    pub fn rc_tag_name(&self, n: u32) -> String {
        format!("v{}-rc{}", self, n)
    }

    /// Next version for a major or minor bump. Patch bumps go through
    /// [`VersionTagIndex::get_next_available_patch_numbers`].
    pub fn bump(&self, level: BumpLevel) -> Self {
        match level {
            BumpLevel::Major => Self::new(self.major + 1, 0, 0),
            BumpLevel::Minor => Self::new(self.major, self.minor + 1, 0),
            BumpLevel::Patch => Self::new(self.major, self.minor, self.patch + 1),
        }
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ReleaseVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ReleaseVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ReleaseVersion> for String {
    fn from(v: ReleaseVersion) -> Self {
        v.to_string()
    }
}

/// Phase of a release. The derived ordering is the order in which manifests
/// contribute to a release context: every rc in sequence, then stage, then
/// production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReleasePhase {
    Rc(u32),
    Stage,
    Production,
}

impl fmt::Display for ReleasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleasePhase::Rc(n) => write!(f, "rc{}", n),
            ReleasePhase::Stage => f.write_str("stage"),
            ReleasePhase::Production => f.write_str("production"),
        }
    }
}

/// Which component of the version a new release increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpLevel {
    Major,
    Minor,
    Patch,
}

impl FromStr for BumpLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(BumpLevel::Major),
            "minor" => Ok(BumpLevel::Minor),
            "patch" => Ok(BumpLevel::Patch),
            other => Err(Error::InvalidArgument {
                message: format!("unknown release level '{}' (major, minor, patch)", other),
            }),
        }
    }
}

/// Parse a tag string into a semantic version
pub fn parse_semver_tag(tag: &str) -> Option<Version> {
    let tag = tag.trim();
    let version_str = tag.strip_prefix('v').unwrap_or(tag);
    Version::parse(version_str).ok()
}

/// Parses a maintenance line given as `X.Y`, `vX.Y` or `X.Y.x`.
pub fn parse_line(line: &str) -> Result<(u64, u64)> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(".x").unwrap_or(trimmed);
    let malformed = || Error::Parsing {
        message: format!("invalid maintenance line '{}': expected X.Y", line),
    };
    let (major, minor) = trimmed.split_once('.').ok_or_else(malformed)?;
    let major = major.parse::<u64>().map_err(|_| malformed())?;
    let minor = minor.parse::<u64>().map_err(|_| malformed())?;
    Ok((major, minor))
}

/// Strips a leading `v` so that `v1.2.3` and `1.2.3` name the same tag.
fn normalize_version_tag(version: &str) -> Result<String> {
    let parsed = parse_semver_tag(version).ok_or_else(|| Error::Validation {
        message: format!("invalid version '{}'", version),
        hint: None,
    })?;
    Ok(format!("v{}", parsed))
}

/// Memoized view over the semantic-version tags of the repository.
pub struct VersionTagIndex {
    vcs: Arc<dyn VersionControl>,
    tags: Option<Vec<String>>,
}

impl VersionTagIndex {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self { vcs, tags: None }
    }

    /// Drops the memoized tag list; the next query re-enumerates tags.
    pub fn refresh(&mut self) {
        self.tags = None;
    }

    fn tags(&mut self) -> Result<&[String]> {
        if self.tags.is_none() {
            let tags = self.vcs.list_tags()?;
            debug!("Indexed {} tags", tags.len());
            self.tags = Some(tags);
        }
        Ok(self.tags.as_deref().unwrap_or_default())
    }

    /// Patch numbers already used by final release tags of `line`.
    ///
    /// Tags that are not semantic versions are skipped, and so are
    /// pre-release tags such as `v1.2.3-rc1`.
    pub fn get_existing_patch_numbers(&mut self, line: &str) -> Result<BTreeSet<u64>> {
        let (major, minor) = parse_line(line)?;
        let numbers = self
            .tags()?
            .iter()
            .filter_map(|tag| parse_semver_tag(tag))
            .filter(|v| v.pre.is_empty() && v.major == major && v.minor == minor)
            .map(|v| v.patch)
            .collect();
        Ok(numbers)
    }

    /// The next `count` free patch numbers of `line`.
    pub fn get_next_available_patch_numbers(&mut self, line: &str, count: usize) -> Result<Vec<u64>> {
        if count == 0 {
            return Err(Error::InvalidArgument {
                message: "count must be greater than zero".to_string(),
            });
        }
        let existing = self.get_existing_patch_numbers(line)?;
        Ok(next_free_numbers(&existing, count))
    }

    /// Highest final release tag, if any.
    pub fn latest_release(&mut self) -> Result<Option<ReleaseVersion>> {
        let latest = self
            .tags()?
            .iter()
            .filter_map(|tag| parse_semver_tag(tag))
            .filter(|v| v.pre.is_empty() && v.build.is_empty())
            .max()
            .map(|v| ReleaseVersion::new(v.major, v.minor, v.patch));
        Ok(latest)
    }

    pub fn check_version_exists(&mut self, version: &str) -> Result<bool> {
        let tag = normalize_version_tag(version)?;
        Ok(self
            .tags()?
            .iter()
            .any(|t| normalize_version_tag(t).is_ok_and(|t| t == tag)))
    }

    pub fn create_version_tag(&mut self, version: &str, message: Option<&str>) -> Result<String> {
        let tag = normalize_version_tag(version)?;
        self.vcs.create_tag(&tag, message)?;
        self.refresh();
        Ok(tag)
    }

    pub fn delete_version_tag(&mut self, version: &str) -> Result<()> {
        let tag = normalize_version_tag(version)?;
        self.vcs.delete_tag(&tag)?;
        self.refresh();
        Ok(())
    }
}

/// Gap-filling allocation: holes below the current maximum first, in
/// ascending order, then the numbers following the maximum. Numbering
/// starts at 1.
pub fn next_free_numbers(existing: &BTreeSet<u64>, count: usize) -> Vec<u64> {
    let mut result = Vec::with_capacity(count);
    let max = existing.iter().next_back().copied().unwrap_or(0);
    let mut candidate = 1;
    while result.len() < count {
        if candidate > max || !existing.contains(&candidate) {
            result.push(candidate);
        }
        candidate += 1;
    }
    result
}
