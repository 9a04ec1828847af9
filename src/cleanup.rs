//! Best-effort cleanup.
//!
//! Rollback runs after something already failed. Each cleanup step is
//! attempted even when an earlier one failed, failures are logged and
//! collected, and nothing here ever replaces the error that triggered the
//! rollback.

use log::warn;

use crate::error::Result;

/// Collects the outcome of independent cleanup steps.
#[derive(Debug, Default)]
pub struct Cleanup {
    context: String,
    attempted: usize,
    failures: Vec<String>,
}

impl Cleanup {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..Self::default()
        }
    }

    /// Runs one step; a failure is logged and recorded, never propagated.
    pub fn step<F>(&mut self, description: &str, action: F) -> &mut Self
    where
        F: FnOnce() -> Result<()>,
    {
        self.attempted += 1;
        if let Err(e) = action() {
            warn!("{}: could not {}: {}", self.context, description, e);
            self.failures.push(format!("{}: {}", description, e));
        }
        self
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// True when at least one step ran and every step failed, which leaves
    /// the resources in need of manual repair.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failures.len() == self.attempted
    }

    /// Logs a final summary when manual repair is needed.
    pub fn finish(&self) {
        if self.all_failed() {
            warn!(
                "{}: every cleanup step failed, manual repair needed:\n  {}",
                self.context,
                self.failures.join("\n  ")
            );
        }
    }
}
