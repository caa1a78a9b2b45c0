use crate::batch::{BatchSummary, Stage, StageOutput};
use crate::error::{Result, SubbatchError};
use crate::ledger::CompletionStore;
use futures::future;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives a stage over a batch of units, consulting and updating a
/// completion store so that reruns skip finished work.
///
/// Per unit: identify → skip check → run → record. A unit's failure is
/// recorded and the batch moves on; only store failures abort the run.
pub struct BatchOrchestrator<S: Stage> {
    stage: S,
    force: bool,
    concurrency: usize,
    show_progress: bool,
    cancelled: Arc<AtomicBool>,
}

impl<S: Stage> BatchOrchestrator<S> {
    pub fn new(stage: S) -> Self {
        Self {
            stage,
            force: false,
            concurrency: 1,
            show_progress: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reprocess units even when the store says they are done.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Number of units whose stage may run at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Once the flag is set no new unit is started.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub async fn run<C: CompletionStore>(
        &self,
        units: Vec<S::Unit>,
        store: &mut C,
    ) -> Result<BatchSummary> {
        let start_time = Instant::now();
        let mut summary = BatchSummary {
            total: units.len(),
            ..Default::default()
        };

        info!("{}: {} units", self.stage.name(), units.len());

        let mut keyed: Vec<(String, S::Unit)> = Vec::with_capacity(units.len());
        for unit in units {
            match self.stage.identify(&unit) {
                Ok(key) => keyed.push((key, unit)),
                Err(e) => {
                    warn!("Skipping {}: {}", self.stage.describe(&unit), e);
                    summary.invalid += 1;
                }
            }
        }

        // Lexical key order makes runs reproducible regardless of listing order.
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let before = keyed.len();
        keyed.dedup_by(|a, b| a.0 == b.0);
        if keyed.len() != before {
            debug!("Dropped {} duplicate units", before - keyed.len());
            summary.skipped += before - keyed.len();
        }

        let check = self.stage.artifact_check();
        let mut pending: Vec<(String, S::Unit)> = Vec::with_capacity(keyed.len());
        for (key, unit) in keyed {
            if !self.force {
                if let Some(completion) = store.completion(&key) {
                    if check.is_satisfied(&key, &completion) {
                        info!("Skipped {} (already completed)", self.stage.describe(&unit));
                        summary.skipped += 1;
                        continue;
                    }
                    warn!(
                        "{} is recorded as completed but its output is missing, reprocessing",
                        self.stage.describe(&unit)
                    );
                }
            }
            pending.push((key, unit));
        }

        let progress_bar = self.progress_bar(pending.len());
        let total_pending = pending.len();
        let stage = &self.stage;
        let cancelled = &self.cancelled;

        let mut results = stream::iter(pending.iter().enumerate())
            .take_while(|_| future::ready(!cancelled.load(Ordering::Relaxed)))
            .map(move |(i, (key, unit))| async move {
                info!("[{}/{}] Processing {}", i + 1, total_pending, stage.describe(unit));
                let unit_start = Instant::now();
                let result = run_isolated(stage, unit).await;
                (key, unit, result, unit_start.elapsed())
            })
            .buffer_unordered(self.concurrency);

        let mut finished = 0;
        while let Some((key, unit, result, elapsed)) = results.next().await {
            finished += 1;

            match result {
                Ok(output) => {
                    store.record_success(
                        key,
                        output.output_path.as_deref(),
                        output.freshness_token.as_deref(),
                    )?;
                    summary.completed += 1;
                    info!(
                        "Completed {} in {:.1}s",
                        stage.describe(unit),
                        elapsed.as_secs_f64()
                    );
                }
                Err(e) => {
                    warn!("Failed {} ({}): {}", stage.describe(unit), e.kind(), e);
                    store.record_failure(key, &e)?;
                    summary.failed += 1;
                }
            }

            progress_bar.inc(1);
        }

        progress_bar.finish_and_clear();

        summary.interrupted = total_pending - finished;
        if summary.interrupted > 0 {
            warn!("Cancelled: {} units were not started", summary.interrupted);
        }

        summary.elapsed = start_time.elapsed();
        info!(
            "{}: {} completed, {} skipped, {} failed, {} total",
            self.stage.name(),
            summary.completed,
            summary.skipped,
            summary.failed,
            summary.total
        );

        Ok(summary)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(200));
        pb
    }
}

/// Run one unit's stage, turning a panic into an ordinary stage failure.
async fn run_isolated<S: Stage>(stage: &S, unit: &S::Unit) -> Result<StageOutput> {
    AssertUnwindSafe(stage.process(unit))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "stage panicked".to_string());
            Err(SubbatchError::StageFailure(format!("panic: {message}")))
        })
}
