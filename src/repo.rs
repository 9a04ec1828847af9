//! # Repository Context
//!
//! [`RepoContext`] bundles what every workflow needs: the repository root,
//! its configuration, and the four external collaborators (Git, the
//! database, the script runner and the code generator). It is cheap to
//! clone; collaborators sit behind `Arc`.
//!
//! [`Repo`] is built once per invocation and hands out the
//! [`PatchLifecycle`] facade, constructed on first use, and
//! [`ReleasePromotion`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::codegen::{CodeGenerator, CommandGenerator};
use crate::config::{self, RepoConfig};
use crate::database::{PsqlExecutor, SchemaExecutor};
use crate::defaults;
use crate::error::Result;
use crate::git::{SystemGit, VersionControl};
use crate::lifecycle::PatchLifecycle;
use crate::patch_dir::{PythonRunner, ScriptRunner};
use crate::promotion::ReleasePromotion;
use crate::suggestions;

/// Root, configuration and collaborators of one repository.
#[derive(Clone)]
pub struct RepoContext {
    root: PathBuf,
    config: RepoConfig,
    vcs: Arc<dyn VersionControl>,
    database: Arc<dyn SchemaExecutor>,
    scripts: Arc<dyn ScriptRunner>,
    codegen: Arc<dyn CodeGenerator>,
}

impl RepoContext {
    pub fn new(
        root: impl Into<PathBuf>,
        config: RepoConfig,
        vcs: Arc<dyn VersionControl>,
        database: Arc<dyn SchemaExecutor>,
        scripts: Arc<dyn ScriptRunner>,
        codegen: Arc<dyn CodeGenerator>,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            vcs,
            database,
            scripts,
            codegen,
        }
    }

    /// Context backed by the system `git`, the PostgreSQL client tools, the
    /// configured Python interpreter and the configured generator command.
    pub fn system(root: impl Into<PathBuf>, config: RepoConfig) -> Self {
        let root = root.into();
        let vcs = Arc::new(SystemGit::new(root.clone(), config.remote.clone()));
        let database = Arc::new(PsqlExecutor::new(config.database()));
        let scripts = Arc::new(PythonRunner::new(config.python.clone()));
        let codegen = Arc::new(CommandGenerator::new(config.codegen.command.clone()));
        Self::new(root, config, vcs, database, scripts, codegen)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn remote(&self) -> &str {
        &self.config.remote
    }

    pub fn vcs(&self) -> &Arc<dyn VersionControl> {
        &self.vcs
    }

    pub fn database(&self) -> &Arc<dyn SchemaExecutor> {
        &self.database
    }

    pub fn scripts(&self) -> &Arc<dyn ScriptRunner> {
        &self.scripts
    }

    pub fn codegen(&self) -> &Arc<dyn CodeGenerator> {
        &self.codegen
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.root.join(&self.config.layout.patches_dir)
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join(&self.config.layout.releases_dir)
    }

    pub fn schema_file(&self) -> PathBuf {
        self.root.join(&self.config.layout.schema_file)
    }

    /// `path` relative to the repository root, as Git expects it.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Fails unless the working tree matches `HEAD`.
    pub fn ensure_clean(&self) -> Result<()> {
        let modified = self.vcs.modified_files()?;
        if modified.is_empty() {
            Ok(())
        } else {
            Err(suggestions::dirty_working_tree(&modified))
        }
    }

    pub fn add_file(&self, path: &Path) -> Result<()> {
        let relative = self.relative(path);
        self.vcs.add(&[relative.as_path()])
    }

    /// Stages `path` and commits it.
    pub fn commit_file(&self, path: &Path, message: &str) -> Result<String> {
        self.add_file(path)?;
        self.vcs.commit(message)
    }

    /// Pushes a branch, downgrading failure to a warning. Returns whether
    /// the push succeeded.
    pub fn push_or_warn(&self, branch: &str) -> bool {
        match self.vcs.push_branch(branch) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Could not push {}: {}. Push it later with: {}",
                    branch,
                    e,
                    suggestions::push_command(self.remote(), branch)
                );
                false
            }
        }
    }

    /// [`RepoContext::push_or_warn`] for a tag.
    pub fn push_tag_or_warn(&self, tag: &str) -> bool {
        match self.vcs.push_tag(tag) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Could not push tag {}: {}. Push it later with: git push {} {}",
                    tag,
                    e,
                    self.remote(),
                    tag
                );
                false
            }
        }
    }
}

/// One repository for the duration of one command.
pub struct Repo {
    context: RepoContext,
    patch_manager: Option<PatchLifecycle>,
}

impl Repo {
    pub fn new(context: RepoContext) -> Self {
        Self {
            context,
            patch_manager: None,
        }
    }

    /// Opens the repository rooted at `root` with the system collaborators.
    pub fn open(root: &Path) -> Result<Self> {
        let config = config::from_file(defaults::config_path(root))?;
        debug!("Opened repository {} at {}", config.package_name, root.display());
        Ok(Self::new(RepoContext::system(root, config)))
    }

    /// Opens the repository containing `start`.
    pub fn discover(start: &Path) -> Result<Self> {
        let root = config::find_root(start)?;
        Self::open(&root)
    }

    pub fn context(&self) -> &RepoContext {
        &self.context
    }

    /// The patch workflow facade, built on first use.
    pub fn patch_manager(&mut self) -> &mut PatchLifecycle {
        let context = &self.context;
        self.patch_manager
            .get_or_insert_with(|| PatchLifecycle::new(context.clone()))
    }

    /// Drops the facade together with its cached indexes.
    pub fn invalidate(&mut self) {
        self.patch_manager = None;
    }

    pub fn promotion(&self) -> ReleasePromotion {
        ReleasePromotion::new(self.context.clone())
    }
}
