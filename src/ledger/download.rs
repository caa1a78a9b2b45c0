use std::path::Path;
use tracing::debug;

use super::{Completion, CompletionStore, IdentitySet, JobLedger};
use crate::error::{Result, SubbatchError};

/// Completion store for the download batch.
///
/// The identity set answers "already downloaded?" and is only written on
/// success. The job ledger, persisted separately, keeps every outcome so a
/// failed or timed-out download stays on record until it succeeds.
#[derive(Debug)]
pub struct DownloadLedger {
    tracked: IdentitySet,
    ledger: JobLedger,
}

impl DownloadLedger {
    pub fn new(tracked: IdentitySet, ledger: JobLedger) -> Self {
        Self { tracked, ledger }
    }

    pub fn load(tracking_path: &Path, ledger_path: &Path) -> Result<Self> {
        Ok(Self::new(
            IdentitySet::load(tracking_path)?,
            JobLedger::load(ledger_path)?,
        ))
    }

    pub fn tracked(&self) -> &IdentitySet {
        &self.tracked
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }
}

impl CompletionStore for DownloadLedger {
    fn completion(&self, key: &str) -> Option<Completion> {
        if self.tracked.contains(key) {
            return Some(Completion { output_path: None });
        }
        self.ledger.completion(key)
    }

    fn record_success(
        &mut self,
        key: &str,
        output_path: Option<&Path>,
        freshness_token: Option<&str>,
    ) -> Result<()> {
        self.ledger.mark_completed(key, output_path, freshness_token)?;
        if self.tracked.insert(key)? {
            debug!("Tracking {}", key);
        }
        Ok(())
    }

    fn record_failure(&mut self, key: &str, error: &SubbatchError) -> Result<()> {
        self.ledger.mark_failed(key, &error.to_string())
    }
}
