//! # Patch Commands
//!
//! `ho-dev patch create|apply|close|attach|detach`. Each one is a thin
//! wrapper over the matching [`PatchLifecycle`](ho_dev::lifecycle::PatchLifecycle)
//! protocol that prints its report.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::RepoLocation;
use ho_dev::lifecycle::{ApplyReport, PatchLifecycle, RelocationReport};
use ho_dev::output::{Mark, OutputConfig};
use ho_dev::patch_id::PatchId;

#[derive(Subcommand, Debug)]
pub enum PatchCommand {
    /// Reserve a patch number and open its branch (run on ho-release/X.Y.Z)
    Create(CreateArgs),
    /// Rebuild the database with the release context and this patch
    Apply(ApplyArgs),
    /// Merge the patch into its release branch (run on ho-patch/<id>)
    Close(CloseArgs),
    /// Bring an orphaned patch back into a release
    Attach(AttachArgs),
    /// Take a candidate out of its release
    Detach(DetachArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Patch id: a ticket number with an optional slug, e.g. 456-user-auth
    pub id: String,

    /// One-line description written to the patch README
    #[arg(short, long, value_name = "TEXT")]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Patch id; defaults to the patch of the current branch
    pub id: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Patch id; defaults to the patch of the current branch
    pub id: Option<String>,
}

#[derive(Args, Debug)]
pub struct AttachArgs {
    pub id: String,

    /// Release to attach to, X.Y.Z
    pub version: String,
}

#[derive(Args, Debug)]
pub struct DetachArgs {
    pub id: String,
}

pub fn execute(command: PatchCommand, location: &RepoLocation, out: &OutputConfig) -> Result<()> {
    let mut repo = location.open()?;
    let lifecycle = repo.patch_manager();

    match command {
        PatchCommand::Create(args) => {
            let report = lifecycle.create(&args.id, args.description.as_deref())?;
            println!(
                "{} Created patch {} for release {}",
                out.mark(Mark::Ok),
                out.name(report.patch_id.as_str()),
                report.version
            );
            println!("   Branch:    {}", report.branch);
            println!("   Reserved:  {}", report.reservation_tag);
            println!("   Directory: {}", report.directory.display());
            if !report.branch_pushed {
                println!(
                    "{} The branch was not pushed; push it before sharing the patch.",
                    out.mark(Mark::Warn)
                );
            }
            if report.on_branch {
                println!("{} Now on {}", out.mark(Mark::Info), report.branch);
            }
        }
        PatchCommand::Apply(args) => apply(args, lifecycle, out)?,
        PatchCommand::Close(args) => {
            let report = lifecycle.close(args.id.as_deref())?;
            println!(
                "{} Closed patch {} into {}",
                out.mark(Mark::Ok),
                out.name(report.patch_id.as_str()),
                report.merged_into
            );
            println!("   Merge commit: {}", report.merge_commit);
            println!("   Manifest:     {}", report.manifest_path.display());
            print_notified(report.notified_branches, out);
        }
        PatchCommand::Attach(args) => {
            let report = lifecycle.attach(&args.id, &args.version)?;
            print_relocation("Attached", "to", &report, out);
        }
        PatchCommand::Detach(args) => {
            let report = lifecycle.detach(&args.id)?;
            print_relocation("Detached", "from", &report, out);
        }
    }
    Ok(())
}

fn apply(args: ApplyArgs, lifecycle: &mut PatchLifecycle, out: &OutputConfig) -> Result<()> {
    if args.json {
        return apply_json(args, lifecycle);
    }

    let report = lifecycle.apply(args.id.as_deref())?;
    let scope = match (&report.version, report.patch_was_in_release) {
        (Some(version), true) => format!("release {}", version),
        (Some(version), false) => format!("release {} (patch applied last)", version),
        (None, _) => "no release".to_string(),
    };
    println!(
        "{} Applied {} with {}",
        out.mark(Mark::Ok),
        out.name(report.patch_id.as_str()),
        scope
    );
    for file in &report.applied_release_files {
        println!("   {}", file);
    }
    for file in &report.applied_current_files {
        println!("   {} (this patch)", file);
    }
    if !report.generated_files.is_empty() {
        println!("   Regenerated {} file(s)", report.generated_files.len());
    }
    Ok(())
}

/// Prints the report as JSON, including for a failed apply, and still
/// exits non-zero on failure.
fn apply_json(args: ApplyArgs, lifecycle: &mut PatchLifecycle) -> Result<()> {
    match lifecycle.apply(args.id.as_deref()) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            let id = match args.id.as_deref() {
                Some(id) => PatchId::parse(id).ok(),
                None => lifecycle
                    .context()
                    .vcs()
                    .current_branch()
                    .ok()
                    .and_then(|branch| PatchId::from_branch(&branch).ok()),
            };
            if let Some(id) = id {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ApplyReport::failed(id, &e))?
                );
            }
            Err(e.into())
        }
    }
}

fn print_relocation(verb: &str, preposition: &str, report: &RelocationReport, out: &OutputConfig) {
    println!(
        "{} {} patch {} {} release {}, now {}",
        out.mark(Mark::Ok),
        verb,
        out.name(report.patch_id.as_str()),
        preposition,
        report.version,
        out.status(report.status)
    );
    if report.moved {
        println!("   Directory: {}", report.directory.display());
    }
    print_notified(report.notified_branches, out);
}

fn print_notified(count: usize, out: &OutputConfig) {
    if count > 0 {
        println!(
            "{} Updated the manifest on {} other patch branch(es)",
            out.mark(Mark::Info),
            count
        );
    }
}
