//! # ho-dev CLI
//!
//! Binary entry point for the `ho-dev` command-line tool.
//!
//! It parses the arguments with `clap`, sets up logging and dispatches to
//! the matching command. The patch and release workflows live in the
//! `ho_dev` library; this binary only renders their reports.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
