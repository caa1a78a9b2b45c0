use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::snapshot::{read_json, write_json};
use super::{Completion, CompletionStore};
use crate::error::{Result, SubbatchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one unit of work as stored in the ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "output_srt")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Freshness token. Recorded on completion, not compared on later runs.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "processed_at")]
    pub processed_at: Option<String>,
}

impl JobRecord {
    pub fn completed(output_path: Option<&Path>, freshness_token: Option<&str>) -> Self {
        Self {
            status: JobStatus::Completed,
            output_path: output_path.map(|p| p.display().to_string()),
            error: None,
            processed_at: freshness_token.map(str::to_string),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            output_path: None,
            error: Some(error.into()),
            processed_at: None,
        }
    }
}

/// Durable mapping from identity key to job outcome.
///
/// Every mutation rewrites the whole document through an atomic snapshot.
/// One process at a time: there is no cross-process locking.
#[derive(Debug)]
pub struct JobLedger {
    path: PathBuf,
    records: BTreeMap<String, JobRecord>,
}

impl JobLedger {
    /// Load the ledger at `path`. A missing document is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records: BTreeMap<String, JobRecord> = read_json(&path)?.unwrap_or_default();
        info!("Loaded {} ledger records from {}", records.len(), path.display());
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&JobRecord> {
        self.records.get(key)
    }

    /// Absent keys are pending.
    pub fn status(&self, key: &str) -> JobStatus {
        self.records
            .get(key)
            .map(|r| r.status)
            .unwrap_or(JobStatus::Pending)
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.status(key) == JobStatus::Completed
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &JobRecord)> {
        self.records.iter()
    }

    pub fn mark_completed(
        &mut self,
        key: &str,
        output_path: Option<&Path>,
        freshness_token: Option<&str>,
    ) -> Result<()> {
        self.apply(key, JobRecord::completed(output_path, freshness_token))
    }

    pub fn mark_failed(&mut self, key: &str, error: &str) -> Result<()> {
        let message = if error.trim().is_empty() {
            "unknown error"
        } else {
            error
        };
        self.apply(key, JobRecord::failed(message))
    }

    // Memory never runs ahead of disk: a failed persist restores the old record.
    fn apply(&mut self, key: &str, record: JobRecord) -> Result<()> {
        let status = record.status;
        let previous = self.records.insert(key.to_string(), record);

        if let Err(e) = self.persist() {
            match previous {
                Some(old) => {
                    self.records.insert(key.to_string(), old);
                }
                None => {
                    self.records.remove(key);
                }
            }
            return Err(e);
        }

        debug!("Ledger: {} -> {}", key, status);
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        write_json(&self.path, &self.records)
    }
}

impl CompletionStore for JobLedger {
    fn completion(&self, key: &str) -> Option<Completion> {
        self.records
            .get(key)
            .filter(|r| r.status == JobStatus::Completed)
            .map(|r| Completion {
                output_path: r.output_path.as_ref().map(PathBuf::from),
            })
    }

    fn record_success(
        &mut self,
        key: &str,
        output_path: Option<&Path>,
        freshness_token: Option<&str>,
    ) -> Result<()> {
        self.mark_completed(key, output_path, freshness_token)
    }

    fn record_failure(&mut self, key: &str, error: &SubbatchError) -> Result<()> {
        self.mark_failed(key, &error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = JobLedger::load(dir.path().join("records.json")).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.status("anything"), JobStatus::Pending);
    }

    #[test]
    fn test_completed_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");

        let mut ledger = JobLedger::load(&path).unwrap();
        ledger
            .mark_completed("videos/a.mp4", Some(Path::new("subs/a.srt")), Some("1700000000.5"))
            .unwrap();
        drop(ledger);

        let reloaded = JobLedger::load(&path).unwrap();
        assert!(reloaded.is_completed("videos/a.mp4"));
        let record = reloaded.get("videos/a.mp4").unwrap();
        assert_eq!(record.output_path.as_deref(), Some("subs/a.srt"));
        assert_eq!(record.processed_at.as_deref(), Some("1700000000.5"));
    }

    #[test]
    fn test_failed_then_completed_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");

        let mut ledger = JobLedger::load(&path).unwrap();
        ledger.mark_failed("k", "ffmpeg exited with 1").unwrap();
        assert_eq!(ledger.status("k"), JobStatus::Failed);
        assert!(!ledger.is_completed("k"));

        ledger.mark_completed("k", None, None).unwrap();
        let reloaded = JobLedger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("k").unwrap().error, None);
    }

    #[test]
    fn test_empty_error_message_is_replaced() {
        let dir = TempDir::new().unwrap();
        let mut ledger = JobLedger::load(dir.path().join("records.json")).unwrap();
        ledger.mark_failed("k", "  ").unwrap();
        assert_eq!(ledger.get("k").unwrap().error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn test_document_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");

        let mut ledger = JobLedger::load(&path).unwrap();
        ledger
            .mark_completed("a", Some(Path::new("a.srt")), Some("12.0"))
            .unwrap();
        ledger.mark_failed("b", "boom").unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["a"]["status"], "completed");
        assert_eq!(doc["a"]["outputPath"], "a.srt");
        assert_eq!(doc["a"]["processedAt"], "12.0");
        assert!(doc["a"].get("error").is_none());
        assert_eq!(doc["b"]["status"], "failed");
        assert_eq!(doc["b"]["error"], "boom");
    }

    #[test]
    fn test_reads_snake_case_documents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            r#"{"v/a.mp4": {"status": "completed", "output_srt": "s/a.srt", "processed_at": "1.0"}}"#,
        )
        .unwrap();

        let ledger = JobLedger::load(&path).unwrap();
        let completion = ledger.completion("v/a.mp4").unwrap();
        assert_eq!(completion.output_path, Some(PathBuf::from("s/a.srt")));
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone").join("records.json");

        let mut ledger = JobLedger::load(&path).unwrap();
        let err = ledger.mark_completed("k", None, None).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ledger.status("k"), JobStatus::Pending);
    }

    #[test]
    fn test_corrupt_document_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let err = JobLedger::load(&path).unwrap_err();
        assert!(matches!(err, SubbatchError::LedgerIo { .. }));
    }
}
