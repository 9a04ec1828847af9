//! `ho-dev completions <shell>`: print a tab-completion script.
//!
//! The script covers the nested `patch` and `release` subcommands and the
//! global `--repo`, `--log-level` and `--color` flags. It needs no
//! repository, so it works right after installation:
//!
//! ```bash
//! ho-dev completions bash > ~/.local/share/bash-completion/completions/ho-dev
//! ho-dev completions zsh > ~/.zfunc/_ho-dev
//! ho-dev completions fish > ~/.config/fish/completions/ho-dev.fish
//! ```

use std::io;

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

use crate::cli::Cli;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn execute(args: CompletionsArgs) -> Result<()> {
    write_completions(args.shell, &mut io::stdout());
    Ok(())
}

fn write_completions(shell: Shell, writer: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, writer);
}
