//! # Status Command Implementation
//!
//! Shows every known patch as a tree: releases, their patches in
//! application order, then the orphaned and unassigned patches. `--json`
//! prints the same report for scripts.
//!
//! This command is read-only.

use std::borrow::Cow;
use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, Style, TreeItem};

use super::RepoLocation;
use ho_dev::lifecycle::{PatchSummary, StatusReport};
use ho_dev::output::OutputConfig;
use ho_dev::status::PatchStatus;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: StatusArgs, location: &RepoLocation, out: &OutputConfig) -> Result<()> {
    let mut repo = location.open()?;
    let report = repo.patch_manager().status_report()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_tree(&build_tree(&report, out))?;
    Ok(())
}

#[derive(Clone, Debug)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(label: String) -> Self {
        Self {
            label,
            children: Vec::new(),
        }
    }
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: Write>(&self, f: &mut W, _style: &Style) -> io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}

fn patch_label(patch: &PatchSummary, out: &OutputConfig) -> String {
    match &patch.merge_commit {
        Some(commit) => format!(
            "{} [{}] {}",
            patch.id,
            out.status(patch.status),
            &commit[..commit.len().min(8)]
        ),
        None => format!("{} [{}]", patch.id, out.status(patch.status)),
    }
}

fn build_tree(report: &StatusReport, out: &OutputConfig) -> TreeNode {
    let mut children: Vec<TreeNode> = report
        .releases
        .iter()
        .map(|release| TreeNode {
            label: format!("{} ({})", out.name(&release.version.to_string()), release.phase),
            children: release
                .patches
                .iter()
                .map(|patch| TreeNode::leaf(patch_label(patch, out)))
                .collect(),
        })
        .collect();

    if !report.orphaned.is_empty() {
        children.push(TreeNode {
            label: out.status(PatchStatus::Orphaned),
            children: report
                .orphaned
                .iter()
                .map(|id| TreeNode::leaf(id.to_string()))
                .collect(),
        });
    }
    if !report.unassigned.is_empty() {
        children.push(TreeNode {
            label: "not in any release".to_string(),
            children: report
                .unassigned
                .iter()
                .map(|patch| TreeNode::leaf(patch_label(patch, out)))
                .collect(),
        });
    }

    TreeNode {
        label: format!("on {}", report.current_branch),
        children,
    }
}
