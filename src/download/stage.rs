use super::{Downloader, SourceEntry};
use crate::batch::{directory_contains, ArtifactCheck, Stage, StageOutput};
use crate::error::{Result, SubbatchError};
use crate::identity::{sanitize_name, SourceIdPattern};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Downloads one source entry into `output_dir` as `<title> [<id>].<ext>`.
pub struct DownloadStage<D: Downloader> {
    downloader: D,
    output_dir: PathBuf,
    pattern: SourceIdPattern,
    timeout: Duration,
}

impl<D: Downloader> DownloadStage<D> {
    pub fn new(downloader: D, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            output_dir: output_dir.into(),
            pattern: SourceIdPattern::default(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_pattern(mut self, pattern: SourceIdPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `yt-dlp` output template for an entry.
    pub fn output_template(&self, title: &str, id: &str) -> String {
        let safe_title = sanitize_name(title);
        let file_name = if safe_title.is_empty() {
            format!("[{id}].%(ext)s")
        } else {
            format!("{safe_title} [{id}].%(ext)s")
        };
        self.output_dir.join(file_name).display().to_string()
    }
}

fn locator(unit: &SourceEntry) -> Result<&str> {
    unit.url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            SubbatchError::InvalidIdentity(format!("'{}' has no url", unit.display_title()))
        })
}

#[async_trait]
impl<D: Downloader> Stage for DownloadStage<D> {
    type Unit = SourceEntry;

    fn name(&self) -> &'static str {
        "download"
    }

    fn identify(&self, unit: &SourceEntry) -> Result<String> {
        self.pattern.derive_key(locator(unit)?)
    }

    fn describe(&self, unit: &SourceEntry) -> String {
        unit.display_title().to_string()
    }

    fn artifact_check(&self) -> ArtifactCheck {
        ArtifactCheck::DirectoryContains(self.output_dir.clone())
    }

    async fn process(&self, unit: &SourceEntry) -> Result<StageOutput> {
        let url = locator(unit)?;
        let id = self.pattern.derive_key(url)?;
        let template = self.output_template(unit.display_title(), &id);
        debug!("Downloading {} to {}", url, template);

        let outcome = self.downloader.fetch(url, &template, self.timeout).await?;
        if !outcome.success() {
            let code = outcome
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(SubbatchError::StageFailure(format!(
                "downloader exited with {}: {}",
                code, outcome.captured_error
            )));
        }

        let output_path = directory_contains(&self.output_dir, &id);
        info!("Downloaded {} [{}]", unit.display_title(), id);

        Ok(StageOutput {
            output_path,
            freshness_token: None,
        })
    }
}
