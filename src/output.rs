//! # Console Output
//!
//! Colour and symbol policy for the command layer.
//!
//! Colour is decided once per invocation from the `--color` flag and the
//! usual environment conventions:
//! - `NO_COLOR` disables colours when set (per https://no-color.org/)
//! - `CLICOLOR=0` disables colours
//! - `CLICOLOR_FORCE=1` forces colours even when stdout is not a TTY
//! - `TERM=dumb` disables colours
//!
//! Without colour, emoji markers fall back to bracketed plain text so that
//! logs and CI output stay greppable.

use std::env;

use clap::ValueEnum;
use console::style;

use crate::status::PatchStatus;

/// Value of the global `--color` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

/// Outcome markers printed in front of status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Ok,
    Warn,
    Fail,
    Info,
}

/// Output configuration for one invocation.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    pub fn new(choice: ColorChoice) -> Self {
        let use_color = match choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => detect_color_support(),
        };
        Self { use_color }
    }

    pub fn plain() -> Self {
        Self { use_color: false }
    }

    /// Marker for an outcome.
    pub fn mark(&self, mark: Mark) -> &'static str {
        match (mark, self.use_color) {
            (Mark::Ok, true) => "✅",
            (Mark::Ok, false) => "[OK]",
            (Mark::Warn, true) => "⚠️ ",
            (Mark::Warn, false) => "[WARN]",
            (Mark::Fail, true) => "❌",
            (Mark::Fail, false) => "[ERR]",
            (Mark::Info, true) => "📦",
            (Mark::Info, false) => "[INFO]",
        }
    }

    /// Patch status, coloured by how far along the patch is.
    pub fn status(&self, status: PatchStatus) -> String {
        if !self.use_color {
            return status.to_string();
        }
        let styled = match status {
            PatchStatus::Candidate => style(status).yellow(),
            PatchStatus::Staged => style(status).green(),
            PatchStatus::Orphaned => style(status).dim(),
        };
        styled.force_styling(true).to_string()
    }

    /// Emphasized identifier (patch id, branch, version).
    pub fn name(&self, name: &str) -> String {
        if self.use_color {
            style(name).bold().force_styling(true).to_string()
        } else {
            name.to_string()
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::new(ColorChoice::Auto)
    }
}

fn detect_color_support() -> bool {
    // The presence of NO_COLOR, even empty, disables colours.
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
        return false;
    }
    if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
        return true;
    }
    if env::var("TERM").is_ok_and(|v| v == "dumb") {
        return false;
    }
    console::Term::stdout().features().colors_supported()
}
