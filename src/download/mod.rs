pub mod stage;
pub mod ytdlp;

pub use stage::DownloadStage;
pub use ytdlp::YtDlpDownloader;

use crate::error::{Result, SubbatchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Raw result of one download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub captured_error: String,
}

impl FetchOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `locator` to `template`. Exceeding `timeout` yields `StageTimeout`.
    async fn fetch(&self, locator: &str, template: &str, timeout: Duration)
        -> Result<FetchOutcome>;
}

/// One entry of a discovered source list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl SourceEntry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            url: Some(url.into()),
        }
    }

    pub fn display_title(&self) -> &str {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title,
            _ => "N/A",
        }
    }
}

/// Load a source list document: a JSON array of `{title, url}` objects.
pub fn load_sources(path: &Path) -> Result<Vec<SourceEntry>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SubbatchError::FileNotFound(path.display().to_string())
        } else {
            SubbatchError::Io(e)
        }
    })?;

    let sources: Vec<SourceEntry> = serde_json::from_str(&contents)?;
    info!("Loaded {} sources from {}", sources.len(), path.display());
    Ok(sources)
}
