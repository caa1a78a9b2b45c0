pub mod download;
pub mod identity_set;
pub mod job;
pub mod snapshot;

pub use download::DownloadLedger;
pub use identity_set::IdentitySet;
pub use job::{JobLedger, JobRecord, JobStatus};
pub use snapshot::{write_atomic, write_json};

use crate::error::{Result, SubbatchError};
use std::path::{Path, PathBuf};

/// What a store remembers about a finished unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub output_path: Option<PathBuf>,
}

/// Durable record of unit outcomes consulted by the batch orchestrator.
///
/// Each `record_*` call is a durability boundary: it returns only after the
/// whole store has been persisted, or fails with `LedgerIo`.
pub trait CompletionStore {
    fn completion(&self, key: &str) -> Option<Completion>;

    fn record_success(
        &mut self,
        key: &str,
        output_path: Option<&Path>,
        freshness_token: Option<&str>,
    ) -> Result<()>;

    fn record_failure(&mut self, key: &str, error: &SubbatchError) -> Result<()>;
}
