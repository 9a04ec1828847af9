//! Patch identifiers.
//!
//! A patch id is `<ticket-number>[-<slug>]`, for example `456-user-auth` or
//! just `456`. Only the leading number has to be unique across the
//! repository; it is claimed by pushing the reservation tag
//! `ho-patch/<number>`.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::defaults::PATCH_PREFIX;
use crate::error::{Error, Result};

fn patch_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)(?:-([A-Za-z0-9]+(?:[-_][A-Za-z0-9]+)*))?$")
            .expect("patch id pattern is valid")
    })
}

/// A validated patch identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatchId {
    raw: String,
    number: u64,
}

impl PatchId {
    /// Parses and validates a patch id.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let caps = patch_id_regex()
            .captures(trimmed)
            .ok_or_else(|| Error::Validation {
                message: format!(
                    "invalid patch id '{}': expected <number>[-<slug>]",
                    input
                ),
                hint: Some("use a ticket number, e.g. 456 or 456-user-auth".to_string()),
            })?;
        let number = caps[1].parse::<u64>().map_err(|e| Error::Validation {
            message: format!("patch number in '{}' is out of range: {}", input, e),
            hint: None,
        })?;
        Ok(Self {
            raw: trimmed.to_string(),
            number,
        })
    }

    /// Extracts the patch id from a `ho-patch/<id>` branch name.
    pub fn from_branch(branch: &str) -> Result<Self> {
        let id = branch
            .strip_prefix(PATCH_PREFIX)
            .ok_or_else(|| Error::Validation {
                message: format!("'{}' is not a patch branch", branch),
                hint: Some(format!("checkout a {}<id> branch first", PATCH_PREFIX)),
            })?;
        Self::parse(id)
    }

    /// The globally unique ticket number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// The optional descriptive suffix.
    pub fn slug(&self) -> Option<&str> {
        self.raw.split_once('-').map(|(_, slug)| slug)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Working branch of this patch.
    pub fn branch_name(&self) -> String {
        format!("{}{}", PATCH_PREFIX, self.raw)
    }

    /// Tag that reserves this patch's number.
    pub fn reservation_tag(&self) -> String {
        format!("{}{}", PATCH_PREFIX, self.number)
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PatchId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PatchId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PatchId> for String {
    fn from(id: PatchId) -> Self {
        id.raw
    }
}
