pub mod consistency;
pub mod orchestrator;

pub use consistency::{directory_contains, ArtifactCheck};
pub use orchestrator::BatchOrchestrator;

use crate::error::Result;
use async_trait::async_trait;
use console::style;
use std::path::PathBuf;
use std::time::Duration;

/// What a stage hands back for the ledger when a unit succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    pub output_path: Option<PathBuf>,
    pub freshness_token: Option<String>,
}

/// One pipeline step applied to a single unit of work.
#[async_trait]
pub trait Stage: Send + Sync {
    type Unit: Send + Sync;

    fn name(&self) -> &'static str;

    /// Derive the unit's identity key. Failing units are skipped, not fatal.
    fn identify(&self, unit: &Self::Unit) -> Result<String>;

    /// Human readable label for progress lines.
    fn describe(&self, unit: &Self::Unit) -> String;

    fn artifact_check(&self) -> ArtifactCheck;

    async fn process(&self, unit: &Self::Unit) -> Result<StageOutput>;
}

/// Counts reported at the end of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Units handed to the orchestrator.
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Units whose identity could not be derived.
    pub invalid: usize,
    /// Units never started because the run was cancelled.
    pub interrupted: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.invalid > 0
    }
}

/// Print the end-of-run summary.
pub fn print_summary(stage: &str, summary: &BatchSummary) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  {} finished in {:.1}s", stage, summary.elapsed.as_secs_f64());
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Completed:  {}", style(summary.completed).green());
    println!("  Skipped:    {}", style(summary.skipped).cyan());
    println!("  Failed:     {}", style(summary.failed).red());
    if summary.invalid > 0 {
        println!("  Invalid:    {}", style(summary.invalid).yellow());
    }
    if summary.interrupted > 0 {
        println!("  Not run:    {}", style(summary.interrupted).yellow());
    }
    println!("  Total:      {}", summary.total);
    println!("═══════════════════════════════════════════════════════════════");
}
