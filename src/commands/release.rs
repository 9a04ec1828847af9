//! # Release Commands
//!
//! `ho-dev release prepare <level>` opens the next release from `ho-prod`;
//! `ho-dev release promote <rc|prod> [version]` moves it one phase forward.

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};

use super::RepoLocation;
use ho_dev::output::{Mark, OutputConfig};
use ho_dev::promotion::{PromotionReport, PromotionTarget};
use ho_dev::version::BumpLevel;

#[derive(Subcommand, Debug)]
pub enum ReleaseCommand {
    /// Open ho-release/X.Y.Z from ho-prod with an empty stage manifest
    Prepare(PrepareArgs),
    /// Promote the release to the next candidate or to production
    Promote(PromoteArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Level {
    Major,
    Minor,
    Patch,
}

impl From<Level> for BumpLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Major => BumpLevel::Major,
            Level::Minor => BumpLevel::Minor,
            Level::Patch => BumpLevel::Patch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Freeze the staged patches as the next release candidate
    Rc,
    /// Ship the release to ho-prod
    Prod,
}

impl From<Target> for PromotionTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Rc => PromotionTarget::Rc,
            Target::Prod => PromotionTarget::Prod,
        }
    }
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[arg(value_enum)]
    pub level: Level,
}

#[derive(Args, Debug)]
pub struct PromoteArgs {
    #[arg(value_enum)]
    pub target: Target,

    /// Release version; defaults to the release of the current branch
    pub version: Option<String>,
}

pub fn execute(command: ReleaseCommand, location: &RepoLocation, out: &OutputConfig) -> Result<()> {
    let repo = location.open()?;
    let mut promotion = repo.promotion();

    let (verb, report) = match command {
        ReleaseCommand::Prepare(args) => ("Prepared", promotion.prepare_release(args.level.into())?),
        ReleaseCommand::Promote(args) => (
            "Promoted",
            promotion.promote(args.target.into(), args.version.as_deref())?,
        ),
    };
    print_report(verb, &report, out);
    Ok(())
}

fn print_report(verb: &str, report: &PromotionReport, out: &OutputConfig) {
    println!(
        "{} {} release {} ({})",
        out.mark(Mark::Ok),
        verb,
        out.name(&report.version.to_string()),
        report.phase
    );
    println!("   Branch:   {}", report.branch);
    println!("   Manifest: {}", report.manifest_path.display());
    if let Some(tag) = &report.tag {
        println!("   Tag:      {}", tag);
    }
    if !report.pushed {
        println!(
            "{} Some references were not pushed; see the warnings above.",
            out.mark(Mark::Warn)
        );
    }
}
