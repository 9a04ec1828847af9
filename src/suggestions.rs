//! # Error Suggestions
//!
//! Constructors for the errors users hit most often, each carrying a hint
//! that tells them how to get unstuck. Errors should say what went wrong
//! AND what to run next.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crate::suggestions;
//!
//! // Instead of:
//! return Err(Error::validation("not on a release branch"));
//!
//! // Use:
//! return Err(suggestions::not_on_release_branch(&current));
//! ```

use crate::defaults::{PATCH_PREFIX, RELEASE_PREFIX};
use crate::error::Error;
use crate::patch_id::PatchId;
use crate::version::ReleaseVersion;

/// The exact command that publishes `reference` by hand.
pub fn push_command(remote: &str, reference: &str) -> String {
    format!("git push --set-upstream {} {}", remote, reference)
}

/// The current branch is not a `ho-release/X.Y.Z` branch.
pub fn not_on_release_branch(current: &str) -> Error {
    Error::validation_with_hint(
        format!("this must run on a release branch, current branch is '{}'", current),
        format!("git checkout {}<version>", RELEASE_PREFIX),
    )
}

/// The current branch is not the working branch of `id`.
pub fn not_on_patch_branch(id: &PatchId, current: &str) -> Error {
    Error::validation_with_hint(
        format!(
            "patch {} must be closed from its own branch, current branch is '{}'",
            id, current
        ),
        format!("git checkout {}", id.branch_name()),
    )
}

/// The working tree has uncommitted changes.
pub fn dirty_working_tree(files: &[String]) -> Error {
    let shown: Vec<&str> = files.iter().take(5).map(String::as_str).collect();
    let more = if files.len() > shown.len() {
        format!(" and {} more", files.len() - shown.len())
    } else {
        String::new()
    };
    Error::validation_with_hint(
        format!("working tree has uncommitted changes: {}{}", shown.join(", "), more),
        "commit or stash your changes first (git status)",
    )
}

/// No remote means patch numbers cannot be reserved.
pub fn missing_remote(remote: &str) -> Error {
    Error::validation_with_hint(
        format!(
            "remote '{}' is not configured, patch numbers cannot be reserved without it",
            remote
        ),
        format!("git remote add {} <url>", remote),
    )
}

/// Somebody already pushed the reservation tag of `id`.
pub fn reservation_conflict(id: &PatchId) -> Error {
    Error::ReservationConflict {
        number: id.number(),
        tag: id.reservation_tag(),
        hint: Some(format!(
            "another developer owns {}; pick a new ticket number",
            id.reservation_tag()
        )),
    }
}

/// `id` is not known anywhere. Suggests a close match among `known`.
pub fn unknown_patch(id: &PatchId, known: &[PatchId]) -> Error {
    let names: Vec<&str> = known.iter().map(PatchId::as_str).collect();
    let hint = match find_similar(id.as_str(), &names) {
        Some(similar) => format!("did you mean '{}'? ho-dev status lists every patch", similar),
        None => "ho-dev status lists every patch".to_string(),
    };
    Error::NotFound {
        resource: id.to_string(),
        message: "unknown patch".to_string(),
        hint: Some(hint),
    }
}

/// `close` could not find `id` as a candidate in any release.
pub fn not_a_candidate(id: &PatchId) -> Error {
    Error::NotFound {
        resource: id.to_string(),
        message: "not found in any candidates file".to_string(),
        hint: Some(format!(
            "attach it to a release first: ho-dev patch attach {} <version>",
            id
        )),
    }
}

/// A release cannot be promoted while some of its patches are unmerged.
pub fn candidates_remain(version: &ReleaseVersion, ids: &[PatchId]) -> Error {
    let list: Vec<&str> = ids.iter().map(PatchId::as_str).collect();
    Error::validation_with_hint(
        format!(
            "release {} still has candidate patches: {}",
            version,
            list.join(", ")
        ),
        "close them (ho-dev patch close) or detach them (ho-dev patch detach <id>)",
    )
}

/// Re-applying the release context changed committed files.
pub fn idempotence_violation(id: &PatchId, files: Vec<String>) -> Error {
    Error::IdempotenceViolation {
        patch_id: id.to_string(),
        files,
        hint: Some(format!(
            "on {}{}, run `ho-dev patch apply`, commit the regenerated files, then close again",
            PATCH_PREFIX, id
        )),
    }
}

/// Attaches the manual push command to a network failure.
pub fn with_push_hint(error: Error, remote: &str, reference: &str) -> Error {
    match error {
        Error::Network {
            operation,
            message,
            hint: None,
        } => Error::Network {
            operation,
            message,
            hint: Some(push_command(remote, reference)),
        },
        other => other,
    }
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein distance over chars, single-row variant.
fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(row[j + 1] + 1);
        }
    }
    row[b_chars.len()]
}
