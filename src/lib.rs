pub mod batch;
pub mod config;
pub mod download;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod media;
pub mod pipeline;
pub mod subtitle;
pub mod transcribe;

pub use batch::{print_summary, BatchOrchestrator, BatchSummary, Stage, StageOutput};
pub use config::Config;
pub use error::{FailureKind, Result, SubbatchError};
pub use ledger::{CompletionStore, DownloadLedger, IdentitySet, JobLedger};
pub use pipeline::SubtitleStage;
