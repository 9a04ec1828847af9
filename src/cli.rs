//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};

use crate::commands;
use ho_dev::defaults::REPO_ENV;
use ho_dev::output::{ColorChoice, OutputConfig};

/// ho-dev - Git-centric database patch and release management
#[derive(Parser, Debug)]
#[command(name = "ho-dev")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Repository root; discovered from the working directory when omitted
    #[arg(long, global = true, value_name = "PATH", env = REPO_ENV)]
    repo: Option<PathBuf>,

    /// Colorize output
    #[arg(long, global = true, value_name = "WHEN", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, apply, close, attach or detach a patch
    #[command(subcommand)]
    Patch(commands::patch::PatchCommand),

    /// Prepare and promote releases
    #[command(subcommand)]
    Release(commands::release::ReleaseCommand),

    /// Show every known patch grouped by release
    Status(commands::status::StatusArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let out = OutputConfig::new(self.color);
        let repo = commands::RepoLocation::new(self.repo);

        match self.command {
            Commands::Patch(command) => commands::patch::execute(command, &repo, &out),
            Commands::Release(command) => commands::release::execute(command, &repo, &out),
            Commands::Status(args) => commands::status::execute(args, &repo, &out),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: &str) {
    // try_init: a second initialization in the same process is not an error.
    let _ = Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}
