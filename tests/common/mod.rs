//! Shared test utilities for integration and E2E tests.
//!
//! The integration tests drive the real lifecycle code against in-memory
//! fakes of its four collaborators:
//!
//! - [`FakeGit`] keeps commits as full snapshots of the working tree and
//!   writes them to a temporary directory on checkout, merge and reset, so
//!   the lifecycle sees the same files it would see with real Git. Several
//!   clones can share one [`FakeRemote`], which is how reservation races
//!   between developers are simulated.
//! - [`FakeDatabase`] records statements and schema restores.
//! - [`FakeScripts`] records `.py` runs.
//! - [`FakeGenerator`] writes `generated/<table>.txt` for every table the
//!   fake database has seen created, like an ORM generator would.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let repo = TestRepo::with_release();
//!     repo.create_patch("1-users", &[("01_users.sql", "CREATE TABLE users (id int);")]);
//! }
//! ```

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use assert_fs::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

use ho_dev::codegen::CodeGenerator;
use ho_dev::config;
use ho_dev::database::SchemaExecutor;
use ho_dev::error::{Error, Result};
use ho_dev::git::VersionControl;
use ho_dev::lifecycle::{CloseReport, PatchLifecycle};
use ho_dev::manifest::ReleaseManifest;
use ho_dev::patch_dir::ScriptRunner;
use ho_dev::patch_id::PatchId;
use ho_dev::promotion::ReleasePromotion;
use ho_dev::repo::{Repo, RepoContext};
use ho_dev::version::{BumpLevel, ReleasePhase, ReleaseVersion};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    pub use super::{
        FakeDatabase, FakeGit, FakeRemote, TestFixture, TestRepo, PATCHES, RELEASE, RELEASE_BRANCH,
        STAGE_MANIFEST,
    };
}

/// Release prepared by [`TestRepo::with_release`].
pub const RELEASE: &str = "0.1.0";
pub const RELEASE_BRANCH: &str = "ho-release/0.1.0";
pub const STAGE_MANIFEST: &str = ".hop/releases/0.1.0-stage.toml";
pub const PATCHES: &str = "Patches";

const CONFIG: &str = "package_name = \"blog\"\n";
const SCHEMA: &str = "-- blog schema\nCREATE TABLE authors (id int);\n";

type Tree = BTreeMap<String, Vec<u8>>;

/// Commit ids are unique across every fake repository of the test binary.
static NEXT_COMMIT: AtomicU64 = AtomicU64::new(1);

fn git_error(command: &str, stderr: impl Into<String>) -> Error {
    Error::GitCommand {
        command: command.to_string(),
        stderr: stderr.into(),
    }
}

fn network_error(operation: &str) -> Error {
    Error::Network {
        operation: operation.to_string(),
        message: "Could not resolve host: fake-remote".to_string(),
        hint: None,
    }
}

fn normalize(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let text = text.trim_start_matches("./").trim_end_matches('/');
    if text == "." {
        String::new()
    } else {
        text.to_string()
    }
}

fn under(path: &str, prefix: &str) -> bool {
    prefix.is_empty() || path == prefix || path.starts_with(&format!("{}/", prefix))
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RemoteState {
    tags: BTreeMap<String, String>,
    branches: BTreeMap<String, String>,
}

/// The shared remote: tag and branch refs only.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.lock().tags.contains_key(tag)
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.lock().branches.contains_key(branch)
    }

    pub fn branch_head(&self, branch: &str) -> Option<String> {
        self.lock().branches.get(branch).cloned()
    }

    pub fn tags(&self) -> Vec<String> {
        self.lock().tags.keys().cloned().collect()
    }

    /// A tag pushed by someone else.
    pub fn insert_tag(&self, tag: &str) {
        self.lock()
            .tags
            .insert(tag.to_string(), "0".repeat(40));
    }
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Commit {
    message: String,
    parents: Vec<String>,
    tree: Tree,
}

/// Failure injection for [`FakeGit`].
#[derive(Debug, Clone, Default)]
pub struct Knobs {
    /// Every remote operation fails with a network error.
    pub offline: bool,
    /// `fetch_tags` succeeds without fetching anything.
    pub stale_fetch: bool,
    /// Branch pushes fail when the branch starts with this prefix.
    pub fail_branch_push: Option<String>,
    /// Merging this branch reports a conflict.
    pub conflict_on: Option<String>,
    /// Commits whose message contains this text fail.
    pub fail_commit_matching: Option<String>,
    /// Checking out this branch fails.
    pub fail_checkout_to: Option<String>,
    pub no_remote: bool,
}

#[derive(Debug, Clone)]
struct GitState {
    commits: BTreeMap<String, Commit>,
    branches: BTreeMap<String, String>,
    head: String,
    tags: BTreeMap<String, String>,
    index: BTreeSet<String>,
    knobs: Knobs,
}

impl GitState {
    fn head_commit(&self) -> Result<String> {
        self.branches
            .get(&self.head)
            .cloned()
            .ok_or_else(|| git_error("rev-parse HEAD", "HEAD has no commit"))
    }

    fn tree_of(&self, commit: &str) -> Tree {
        self.commits
            .get(commit)
            .map(|c| c.tree.clone())
            .unwrap_or_default()
    }

    fn head_tree(&self) -> Tree {
        self.head_commit()
            .map(|c| self.tree_of(&c))
            .unwrap_or_default()
    }

    fn resolve(&self, rev: &str) -> Option<String> {
        if rev == "HEAD" {
            return self.head_commit().ok();
        }
        self.branches
            .get(rev)
            .or_else(|| self.tags.get(rev))
            .cloned()
            .or_else(|| self.commits.contains_key(rev).then(|| rev.to_string()))
    }

    fn ancestors(&self, commit: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([commit.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(c) = self.commits.get(&id) {
                queue.extend(c.parents.iter().cloned());
            }
        }
        seen
    }

    fn merge_base(&self, ours: &str, theirs: &str) -> Option<String> {
        let ours = self.ancestors(ours);
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([theirs.to_string()]);
        while let Some(id) = queue.pop_front() {
            if ours.contains(&id) {
                return Some(id);
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(c) = self.commits.get(&id) {
                queue.extend(c.parents.iter().cloned());
            }
        }
        None
    }

    fn add_commit(&mut self, message: &str, parents: Vec<String>, tree: Tree) -> String {
        let id = format!("{:040x}", NEXT_COMMIT.fetch_add(1, Ordering::SeqCst));
        self.commits.insert(
            id.clone(),
            Commit {
                message: message.to_string(),
                parents,
                tree,
            },
        );
        id
    }
}

/// Snapshot-based fake of the system `git`, working on a real directory.
#[derive(Debug, Clone)]
pub struct FakeGit {
    root: PathBuf,
    remote: FakeRemote,
    state: Arc<Mutex<GitState>>,
}

impl FakeGit {
    /// Commits everything under `root` on `ho-prod` and publishes it.
    pub fn init(root: &Path, remote: FakeRemote) -> Self {
        let mut state = GitState {
            commits: BTreeMap::new(),
            branches: BTreeMap::new(),
            head: "ho-prod".to_string(),
            tags: BTreeMap::new(),
            index: BTreeSet::new(),
            knobs: Knobs::default(),
        };
        let git = Self {
            root: root.to_path_buf(),
            remote,
            state: Arc::new(Mutex::new(state.clone())),
        };
        let tree = git.disk_tree();
        let id = state.add_commit("Initial commit", Vec::new(), tree);
        state.branches.insert("ho-prod".to_string(), id.clone());
        *git.lock() = state;
        git.remote
            .lock()
            .branches
            .insert("ho-prod".to_string(), id);
        git
    }

    /// A clone of this repository checked out in `root`, sharing the remote.
    pub fn clone_into(&self, root: &Path) -> Self {
        let mut state = self.lock().clone();
        state.index.clear();
        state.knobs = Knobs::default();
        let tree = state.head_tree();
        let clone = Self {
            root: root.to_path_buf(),
            remote: self.remote.clone(),
            state: Arc::new(Mutex::new(state)),
        };
        clone.write_diff(&Tree::new(), &tree, &BTreeSet::new());
        clone
    }

    fn lock(&self) -> MutexGuard<'_, GitState> {
        self.state.lock().unwrap()
    }

    pub fn configure(&self, f: impl FnOnce(&mut Knobs)) {
        f(&mut self.lock().knobs);
    }

    pub fn branches(&self) -> Vec<String> {
        self.lock().branches.keys().cloned().collect()
    }

    pub fn local_tags(&self) -> Vec<String> {
        self.lock().tags.keys().cloned().collect()
    }

    pub fn head_of(&self, branch: &str) -> Option<String> {
        self.lock().branches.get(branch).cloned()
    }

    /// First-parent history of `branch`, newest first.
    pub fn log(&self, branch: &str) -> Vec<String> {
        let state = self.lock();
        let mut messages = Vec::new();
        let mut next = state.branches.get(branch).cloned();
        while let Some(id) = next {
            let Some(commit) = state.commits.get(&id) else {
                break;
            };
            messages.push(commit.message.clone());
            next = commit.parents.first().cloned();
        }
        messages
    }

    /// Content of `path` in the tip of `branch`.
    pub fn file_at(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.lock();
        let commit = state.branches.get(branch)?;
        state
            .tree_of(commit)
            .get(path)
            .map(|c| String::from_utf8_lossy(c).into_owned())
    }

    fn disk_tree(&self) -> Tree {
        let mut tree = Tree::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                if let Ok(content) = fs::read(entry.path()) {
                    tree.insert(normalize(relative), content);
                }
            }
        }
        tree
    }

    fn remove_path(&self, path: &str) {
        let full = self.root.join(path);
        let _ = fs::remove_file(&full);
        // Git does not keep empty directories.
        let mut dir = full.parent().map(Path::to_path_buf);
        while let Some(current) = dir {
            if current == self.root || fs::remove_dir(&current).is_err() {
                break;
            }
            dir = current.parent().map(Path::to_path_buf);
        }
    }

    fn write_path(&self, path: &str, content: &[u8]) {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    /// Moves the working tree from `old` to `new`, leaving `keep` alone.
    fn write_diff(&self, old: &Tree, new: &Tree, keep: &BTreeSet<String>) {
        let paths: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        for path in paths {
            if keep.contains(path.as_str()) {
                continue;
            }
            match new.get(path.as_str()) {
                Some(content) if old.get(path.as_str()) != Some(content) => {
                    self.write_path(path, content)
                }
                Some(_) => {}
                None => self.remove_path(path),
            }
        }
    }

    fn modified(&self, state: &GitState) -> BTreeSet<String> {
        let head = state.head_tree();
        let disk = self.disk_tree();
        head.keys()
            .chain(disk.keys())
            .filter(|p| head.get(p.as_str()) != disk.get(p.as_str()))
            .cloned()
            .collect()
    }

    fn check_online(&self, state: &GitState, operation: &str) -> Result<()> {
        if state.knobs.offline {
            Err(network_error(operation))
        } else {
            Ok(())
        }
    }
}

impl VersionControl for FakeGit {
    fn current_branch(&self) -> Result<String> {
        Ok(self.lock().head.clone())
    }

    fn head_commit(&self) -> Result<String> {
        self.lock().head_commit()
    }

    fn modified_files(&self) -> Result<Vec<String>> {
        let state = self.lock();
        Ok(self.modified(&state).into_iter().collect())
    }

    fn has_remote(&self) -> Result<bool> {
        Ok(!self.lock().knobs.no_remote)
    }

    fn fetch_tags(&self) -> Result<()> {
        let mut state = self.lock();
        self.check_online(&state, "fetch --tags")?;
        if state.knobs.stale_fetch {
            return Ok(());
        }
        for (tag, commit) in self.remote.lock().tags.iter() {
            state.tags.entry(tag.clone()).or_insert_with(|| commit.clone());
        }
        Ok(())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        Ok(self.local_tags())
    }

    fn tag_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.lock().tags.contains_key(tag))
    }

    fn create_tag(&self, tag: &str, _message: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        if state.tags.contains_key(tag) {
            return Err(git_error("tag", format!("tag '{}' already exists", tag)));
        }
        let head = state.head_commit()?;
        state.tags.insert(tag.to_string(), head);
        Ok(())
    }

    fn delete_tag(&self, tag: &str) -> Result<()> {
        let mut state = self.lock();
        match state.tags.remove(tag) {
            Some(_) => Ok(()),
            None => Err(git_error("tag -d", format!("tag '{}' not found", tag))),
        }
    }

    fn push_tag(&self, tag: &str) -> Result<()> {
        let state = self.lock();
        self.check_online(&state, "push tag")?;
        let commit = state
            .tags
            .get(tag)
            .cloned()
            .ok_or_else(|| git_error("push", format!("src refspec {} does not match any", tag)))?;
        let mut remote = self.remote.lock();
        match remote.tags.get(tag) {
            Some(existing) if *existing != commit => Err(Error::RemoteRejected {
                reference: tag.to_string(),
                message: format!("! [rejected] {} -> {} (already exists)", tag, tag),
            }),
            _ => {
                remote.tags.insert(tag.to_string(), commit);
                Ok(())
            }
        }
    }

    fn delete_remote_tag(&self, tag: &str) -> Result<()> {
        let state = self.lock();
        self.check_online(&state, "push --delete tag")?;
        match self.remote.lock().tags.remove(tag) {
            Some(_) => Ok(()),
            None => Err(Error::RemoteRejected {
                reference: tag.to_string(),
                message: "remote ref does not exist".to_string(),
            }),
        }
    }

    fn list_branches(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .branches
            .keys()
            .filter(|b| b.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn branch_exists(&self, branch: &str) -> Result<bool> {
        Ok(self.lock().branches.contains_key(branch))
    }

    fn create_branch(&self, branch: &str, start_point: &str) -> Result<()> {
        let mut state = self.lock();
        if state.branches.contains_key(branch) {
            return Err(git_error("branch", format!("a branch named '{}' already exists", branch)));
        }
        let start = state
            .resolve(start_point)
            .ok_or_else(|| git_error("branch", format!("not a valid object name: '{}'", start_point)))?;
        state.branches.insert(branch.to_string(), start);
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        let mut state = self.lock();
        if state.knobs.fail_checkout_to.as_deref() == Some(branch) {
            return Err(git_error("checkout", format!("cannot check out '{}'", branch)));
        }
        let target = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| git_error("checkout", format!("pathspec '{}' did not match", branch)))?;
        let old = state.head_tree();
        let new = state.tree_of(&target);
        let dirty = self.modified(&state);
        if let Some(path) = dirty.iter().find(|p| old.get(p.as_str()) != new.get(p.as_str())) {
            return Err(git_error(
                "checkout",
                format!("your local changes to {} would be overwritten", path),
            ));
        }
        self.write_diff(&old, &new, &dirty);
        state.head = branch.to_string();
        Ok(())
    }

    fn delete_branch(&self, branch: &str) -> Result<()> {
        let mut state = self.lock();
        if state.head == branch {
            return Err(git_error(
                "branch -D",
                format!("cannot delete branch '{}' checked out", branch),
            ));
        }
        match state.branches.remove(branch) {
            Some(_) => Ok(()),
            None => Err(git_error("branch -D", format!("branch '{}' not found", branch))),
        }
    }

    fn push_branch(&self, branch: &str) -> Result<()> {
        let state = self.lock();
        self.check_online(&state, "push")?;
        if let Some(prefix) = &state.knobs.fail_branch_push {
            if branch.starts_with(prefix.as_str()) {
                return Err(network_error("push"));
            }
        }
        let commit = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| git_error("push", format!("src refspec {} does not match any", branch)))?;
        self.remote
            .lock()
            .branches
            .insert(branch.to_string(), commit);
        Ok(())
    }

    fn delete_remote_branch(&self, branch: &str) -> Result<()> {
        let state = self.lock();
        self.check_online(&state, "push --delete")?;
        match self.remote.lock().branches.remove(branch) {
            Some(_) => Ok(()),
            None => Err(Error::RemoteRejected {
                reference: branch.to_string(),
                message: "remote ref does not exist".to_string(),
            }),
        }
    }

    fn merge(&self, branch: &str, message: &str) -> Result<String> {
        let mut state = self.lock();
        let target = state.head.clone();
        let conflict = |files: String| Error::MergeConflict {
            source_branch: branch.to_string(),
            target_branch: target.clone(),
            message: format!("conflicts in {}", files),
            hint: None,
        };
        if state.knobs.conflict_on.as_deref() == Some(branch) {
            return Err(conflict("schema.sql".to_string()));
        }
        let theirs = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| git_error("merge", format!("{} - not something we can merge", branch)))?;
        let ours = state.head_commit()?;
        if state.ancestors(&ours).contains(&theirs) {
            return Ok(ours);
        }

        let base = state
            .merge_base(&ours, &theirs)
            .map(|c| state.tree_of(&c))
            .unwrap_or_default();
        let ours_tree = state.tree_of(&ours);
        let theirs_tree = state.tree_of(&theirs);
        let mut merged = Tree::new();
        let mut conflicts = Vec::new();
        let paths: BTreeSet<&String> = base
            .keys()
            .chain(ours_tree.keys())
            .chain(theirs_tree.keys())
            .collect();
        for path in paths {
            let (b, o, t) = (
                base.get(path.as_str()),
                ours_tree.get(path.as_str()),
                theirs_tree.get(path.as_str()),
            );
            let result = if o == t || t == b {
                o
            } else if o == b {
                t
            } else {
                conflicts.push(path.clone());
                continue;
            };
            if let Some(content) = result {
                merged.insert(path.clone(), content.clone());
            }
        }
        if !conflicts.is_empty() {
            return Err(conflict(conflicts.join(", ")));
        }

        let dirty = self.modified(&state);
        self.write_diff(&ours_tree, &merged, &dirty);
        let id = state.add_commit(message, vec![ours, theirs], merged);
        let head = state.head.clone();
        state.branches.insert(head, id.clone());
        Ok(id)
    }

    fn add(&self, paths: &[&Path]) -> Result<()> {
        let mut state = self.lock();
        let head = state.head_tree();
        let disk = self.disk_tree();
        for path in paths {
            let prefix = normalize(path);
            let matched: Vec<String> = head
                .keys()
                .chain(disk.keys())
                .filter(|p| under(p, &prefix))
                .cloned()
                .collect();
            if matched.is_empty() {
                return Err(git_error(
                    "add",
                    format!("pathspec '{}' did not match any files", prefix),
                ));
            }
            state.index.extend(matched);
        }
        Ok(())
    }

    fn mv(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.lock();
        let (from, to) = (normalize(from), normalize(to));
        let source = self.root.join(&from);
        if !source.exists() {
            return Err(git_error("mv", format!("bad source, source={}", from)));
        }
        let destination = self.root.join(&to);
        if destination.exists() {
            return Err(git_error("mv", format!("destination exists, destination={}", to)));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let moved: Vec<String> = state
            .head_tree()
            .keys()
            .chain(state.index.iter())
            .filter(|p| under(p, &from))
            .cloned()
            .collect();
        fs::rename(&source, &destination)?;
        state.index.extend(moved);
        let disk = self.disk_tree();
        state
            .index
            .extend(disk.keys().filter(|p| under(p, &to)).cloned());
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        let mut state = self.lock();
        if let Some(pattern) = &state.knobs.fail_commit_matching {
            if message.contains(pattern.as_str()) {
                return Err(git_error("commit", format!("hook rejected commit '{}'", message)));
            }
        }
        let head = state.head_commit()?;
        let old = state.tree_of(&head);
        let mut tree = old.clone();
        for path in std::mem::take(&mut state.index) {
            match fs::read(self.root.join(&path)) {
                Ok(content) => {
                    tree.insert(path, content);
                }
                Err(_) => {
                    tree.remove(&path);
                }
            }
        }
        if tree == old {
            return Err(git_error("commit", "nothing to commit, working tree clean"));
        }
        let id = state.add_commit(message, vec![head], tree);
        let branch = state.head.clone();
        state.branches.insert(branch, id.clone());
        Ok(id)
    }

    fn reset_hard(&self, commit: &str) -> Result<()> {
        let mut state = self.lock();
        let target = state
            .resolve(commit)
            .ok_or_else(|| git_error("reset --hard", format!("unknown revision '{}'", commit)))?;
        let mut old = state.head_tree();
        for path in &state.index {
            old.entry(path.clone()).or_default();
        }
        let new = state.tree_of(&target);
        // Every tracked or staged path is forced back to the target.
        for path in old.keys() {
            if !new.contains_key(path) {
                self.remove_path(path);
            }
        }
        for (path, content) in &new {
            self.write_path(path, content);
        }
        let branch = state.head.clone();
        state.branches.insert(branch, target);
        state.index.clear();
        Ok(())
    }

    fn discard_changes(&self) -> Result<()> {
        let mut state = self.lock();
        let head = state.head_tree();
        let disk = self.disk_tree();
        for path in disk.keys().filter(|p| !head.contains_key(p.as_str())) {
            self.remove_path(path);
        }
        for (path, content) in &head {
            if disk.get(path) != Some(content) {
                self.write_path(path, content);
            }
        }
        state.index.clear();
        Ok(())
    }

    fn checkout_file_from(&self, branch: &str, path: &Path) -> Result<()> {
        let mut state = self.lock();
        let prefix = normalize(path);
        let commit = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| git_error("checkout", format!("invalid reference: {}", branch)))?;
        let files: Vec<(String, Vec<u8>)> = state
            .tree_of(&commit)
            .into_iter()
            .filter(|(p, _)| under(p, &prefix))
            .collect();
        if files.is_empty() {
            return Err(git_error(
                "checkout",
                format!("pathspec '{}' did not match any file(s) known to git", prefix),
            ));
        }
        for (p, content) in files {
            self.write_path(&p, &content);
            state.index.insert(p);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Database, scripts, code generation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DbState {
    statements: Vec<String>,
    restores: usize,
    fail_on: Option<String>,
}

/// Records statements instead of running them.
#[derive(Debug, Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<DbState>>,
}

impl FakeDatabase {
    fn lock(&self) -> MutexGuard<'_, DbState> {
        self.state.lock().unwrap()
    }

    /// Statements since the last restore, the schema dump first.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn restores(&self) -> usize {
        self.lock().restores
    }

    /// Statements containing `text` fail.
    pub fn fail_on(&self, text: &str) {
        self.lock().fail_on = Some(text.to_string());
    }

    fn record(&self, statement: String) {
        self.lock().statements.push(statement);
    }

    /// Tables created since the last restore, in creation order.
    pub fn tables(&self) -> Vec<String> {
        let re = Regex::new(r"(?i)\bCREATE\s+TABLE\s+(\w+)").unwrap();
        let mut tables: Vec<String> = Vec::new();
        for statement in self.lock().statements.iter() {
            for caps in re.captures_iter(statement) {
                let name = caps[1].to_lowercase();
                if !tables.contains(&name) {
                    tables.push(name);
                }
            }
        }
        tables
    }
}

impl SchemaExecutor for FakeDatabase {
    fn execute_query(&self, sql: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(text) = &state.fail_on {
            if sql.contains(text.as_str()) {
                return Err(Error::Database {
                    message: format!("syntax error at or near \"{}\"", text),
                });
            }
        }
        state.statements.push(sql.to_string());
        Ok(())
    }

    fn restore_schema(&self, schema_file: &Path) -> Result<()> {
        let schema = fs::read_to_string(schema_file).map_err(|e| Error::Database {
            message: format!("cannot load {}: {}", schema_file.display(), e),
        })?;
        let mut state = self.lock();
        state.restores += 1;
        state.statements = vec![schema];
        Ok(())
    }
}

/// Records `.py` runs. A script containing `raise` fails.
#[derive(Debug, Clone, Default)]
pub struct FakeScripts {
    db: FakeDatabase,
    runs: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
}

impl FakeScripts {
    pub fn new(db: FakeDatabase) -> Self {
        Self {
            db,
            runs: Arc::default(),
        }
    }

    /// `(script, working_dir)` of every run.
    pub fn runs(&self) -> Vec<(PathBuf, PathBuf)> {
        self.runs.lock().unwrap().clone()
    }
}

impl ScriptRunner for FakeScripts {
    fn run_script(&self, script: &Path, working_dir: &Path) -> Result<()> {
        self.runs
            .lock()
            .unwrap()
            .push((script.to_path_buf(), working_dir.to_path_buf()));
        let source = fs::read_to_string(script)?;
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if source.contains("raise") {
            return Err(Error::Script {
                script: name,
                message: "exited with status 1".to_string(),
            });
        }
        self.db.record(format!("-- script {}", name));
        Ok(())
    }
}

/// Writes `generated/<table>.txt` for each table of the fake database.
#[derive(Debug, Clone, Default)]
pub struct FakeGenerator {
    db: FakeDatabase,
}

impl FakeGenerator {
    pub fn new(db: FakeDatabase) -> Self {
        Self { db }
    }
}

impl CodeGenerator for FakeGenerator {
    fn generate(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut generated = Vec::new();
        for table in self.db.tables() {
            let relative = PathBuf::from("generated").join(format!("{}.txt", table));
            let path = root.join(&relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, format!("model for table {}\n", table))?;
            generated.push(relative);
        }
        Ok(generated)
    }
}

// ---------------------------------------------------------------------------
// Repository fixture
// ---------------------------------------------------------------------------

/// A ho-dev repository in a temporary directory, wired to the fakes.
pub struct TestRepo {
    dir: assert_fs::TempDir,
    pub git: FakeGit,
    pub remote: FakeRemote,
    pub db: FakeDatabase,
    pub scripts: FakeScripts,
    pub codegen: FakeGenerator,
}

impl TestRepo {
    /// Configuration and schema dump committed on `ho-prod`.
    pub fn new() -> Self {
        let dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        dir.child(".hop/config.toml").write_str(CONFIG).unwrap();
        dir.child("model/schema.sql").write_str(SCHEMA).unwrap();
        let remote = FakeRemote::new();
        let git = FakeGit::init(dir.path(), remote.clone());
        Self::assemble(dir, git, remote)
    }

    /// [`TestRepo::new`] with release 0.1.0 prepared and checked out.
    pub fn with_release() -> Self {
        let repo = Self::new();
        repo.promotion()
            .prepare_release(BumpLevel::Minor)
            .expect("prepare release 0.1.0");
        repo
    }

    /// Another developer's clone of this repository.
    pub fn clone_repo(&self) -> Self {
        let dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        let git = self.git.clone_into(dir.path());
        Self::assemble(dir, git, self.remote.clone())
    }

    fn assemble(dir: assert_fs::TempDir, git: FakeGit, remote: FakeRemote) -> Self {
        let db = FakeDatabase::default();
        Self {
            scripts: FakeScripts::new(db.clone()),
            codegen: FakeGenerator::new(db.clone()),
            db,
            dir,
            git,
            remote,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn context(&self) -> RepoContext {
        let config = config::parse(CONFIG).unwrap();
        RepoContext::new(
            self.root(),
            config,
            Arc::new(self.git.clone()),
            Arc::new(self.db.clone()),
            Arc::new(self.scripts.clone()),
            Arc::new(self.codegen.clone()),
        )
    }

    /// A fresh lifecycle, with empty caches.
    pub fn lifecycle(&self) -> PatchLifecycle {
        PatchLifecycle::new(self.context())
    }

    pub fn repo(&self) -> Repo {
        Repo::new(self.context())
    }

    pub fn promotion(&self) -> ReleasePromotion {
        ReleasePromotion::new(self.context())
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        self.dir.child(relative).write_str(content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn current_branch(&self) -> String {
        self.git.current_branch().unwrap()
    }

    pub fn checkout(&self, branch: &str) {
        self.git.checkout(branch).unwrap();
    }

    /// Commits every change in the working tree, if there is any.
    pub fn commit_all(&self, message: &str) {
        if self.git.modified_files().unwrap().is_empty() {
            return;
        }
        self.git.add(&[Path::new(".")]).unwrap();
        self.git.commit(message).unwrap();
    }

    /// Creates `id` from the release branch and commits `files` into its
    /// directory on the patch branch.
    pub fn create_patch(&self, id: &str, files: &[(&str, &str)]) {
        self.checkout(RELEASE_BRANCH);
        self.lifecycle()
            .create(id, None)
            .unwrap_or_else(|e| panic!("create {}: {}", id, e));
        for (name, content) in files {
            self.write(&format!("{}/{}/{}", PATCHES, id, name), content);
        }
        self.commit_all(&format!("Write patch {}", id));
    }

    /// Applies `id` on its branch, commits the generated code, then closes it.
    pub fn close_patch(&self, id: &str) -> CloseReport {
        self.checkout(&format!("ho-patch/{}", id));
        self.lifecycle()
            .apply(Some(id))
            .unwrap_or_else(|e| panic!("apply {}: {}", id, e));
        self.commit_all(&format!("Generated code for {}", id));
        self.lifecycle()
            .close(Some(id))
            .unwrap_or_else(|e| panic!("close {}: {}", id, e))
    }

    /// The stage manifest of 0.1.0 as currently on disk.
    pub fn stage_manifest(&self) -> ReleaseManifest {
        let version = ReleaseVersion::parse(RELEASE).unwrap();
        ReleaseManifest::open(&self.path(".hop/releases"), &version, ReleasePhase::Stage).unwrap()
    }

    pub fn patch_id(id: &str) -> PatchId {
        PatchId::parse(id).unwrap()
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// CLI fixture
// ---------------------------------------------------------------------------

/// A temporary directory for running the `ho-dev` binary.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new().with_config();
/// fixture.command().arg("status").assert();
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Adds `.hop/config.toml` with `content`.
    pub fn with_config_content(self, content: &str) -> Self {
        self.temp_dir
            .child(".hop/config.toml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Adds the minimal configuration.
    pub fn with_config(self) -> Self {
        self.with_config_content(CONFIG)
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// A command running in this fixture's directory, with discovery
    /// overrides and colours cleared.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ho-dev");
        cmd.current_dir(self.path())
            .env_remove("HO_DEV_REPO")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_fixture_config_parses() {
        let fixture = TestFixture::new().with_config();
        let parsed = config::from_file(fixture.path().join(".hop/config.toml")).unwrap();
        assert_eq!(parsed.package_name, "blog");
    }

    #[test]
    fn test_fake_git_checkout_swaps_working_tree() {
        let repo = TestRepo::new();
        repo.git.create_branch("topic", "HEAD").unwrap();
        repo.checkout("topic");
        repo.write("notes/todo.txt", "hello");
        repo.commit_all("notes");
        repo.checkout("ho-prod");
        assert!(!repo.exists("notes"));
        repo.checkout("topic");
        assert_eq!(repo.read("notes/todo.txt"), "hello");
    }

    #[test]
    fn test_fake_git_merge_combines_disjoint_changes() {
        let repo = TestRepo::new();
        repo.git.create_branch("topic", "HEAD").unwrap();
        repo.write("a.txt", "a");
        repo.commit_all("a");
        repo.checkout("topic");
        repo.write("b.txt", "b");
        repo.commit_all("b");
        repo.checkout("ho-prod");
        repo.git.merge("topic", "merge").unwrap();
        assert!(repo.exists("a.txt"));
        assert!(repo.exists("b.txt"));
        assert!(repo.git.modified_files().unwrap().is_empty());
    }

    #[test]
    fn test_fake_git_merge_reports_real_conflicts() {
        let repo = TestRepo::new();
        repo.git.create_branch("topic", "HEAD").unwrap();
        repo.write("model/schema.sql", "ours");
        repo.commit_all("ours");
        repo.checkout("topic");
        repo.write("model/schema.sql", "theirs");
        repo.commit_all("theirs");
        repo.checkout("ho-prod");
        let err = repo.git.merge("topic", "merge").unwrap_err();
        assert!(matches!(err, Error::MergeConflict { .. }));
    }

    #[test]
    fn test_fake_git_discard_removes_untracked_files() {
        let repo = TestRepo::new();
        repo.write("scratch/tmp.txt", "x");
        repo.write("model/schema.sql", "changed");
        repo.git.discard_changes().unwrap();
        assert!(!repo.exists("scratch"));
        assert_eq!(repo.read("model/schema.sql"), SCHEMA);
    }

    #[test]
    fn test_fake_database_tracks_tables() {
        let db = FakeDatabase::default();
        db.execute_query("CREATE TABLE users (id int); create table Posts (id int);")
            .unwrap();
        assert_eq!(db.tables(), vec!["users", "posts"]);
    }
}
